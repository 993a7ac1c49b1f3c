use std::iter::repeat;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::Rng;

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// Full years between `date_of_birth` and `today`.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.years_since(date_of_birth).map(|y| y as i32).unwrap_or(0);
    if date_of_birth > today {
        age = 0;
    }
    age
}

pub fn random_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub mod date_time_as_unix_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(value.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let seconds = i64::deserialize(d)?;
        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_counts_full_years_only() {
        let dob = NaiveDate::from_ymd_opt(2010, 6, 15).unwrap();

        let day_before = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        assert_eq!(age_on(dob, day_before), 15);

        let birthday = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(age_on(dob, birthday), 16);
    }

    #[test]
    fn random_tokens_differ() {
        let a = random_token(32);
        let b = random_token(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
