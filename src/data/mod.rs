pub mod class;
pub mod lesson;
pub mod user;

pub mod filter {
    use bson::spec::BinarySubtype;
    use bson::{doc, Binary, Bson, Document};
    use uuid::Uuid;

    /// UUIDs stored through `uuid_1_as_binary` must be matched with a binary
    /// filter value, not a string.
    #[inline]
    pub fn bin_uuid(id: Uuid) -> Bson {
        Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: id.as_bytes().to_vec(),
        })
    }

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        doc! { "_id": bin_uuid(id) }
    }

    #[inline]
    pub fn by_email(email: impl ToString) -> Document {
        doc! { "email": email.to_string() }
    }
}
