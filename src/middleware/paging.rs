use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome, Request};

/// Pagination and sorting state picked up from request query parameters:
/// `page`/`p`, `len`/`l`, `sort` and `order` (`asc` unless `desc`).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    /// 1-based page index.
    pub page: u32,
    pub page_length: u32,
    pub sort_by: Option<String>,
    pub descending: bool,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            page: 1,
            page_length: 20,
            sort_by: None,
            descending: false,
        }
    }
}

impl PageState {
    pub fn skip(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.page_length as u64
    }

    pub fn limit(&self) -> i64 {
        self.page_length as i64
    }

    pub fn direction(&self) -> i32 {
        if self.descending {
            -1
        } else {
            1
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let length: Option<u32> = request
            .query_value("len")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("l").and_then(|it| it.ok()));

        let page: Option<u32> = request
            .query_value("page")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("p").and_then(|it| it.ok()));

        let sort_by: Option<String> = request.query_value("sort").and_then(|it| it.ok());
        let descending = request
            .query_value::<&str>("order")
            .and_then(|it| it.ok())
            .map(|order| order.eq_ignore_ascii_case("desc"))
            .unwrap_or(false);

        let defaults = PageState::default();
        Outcome::Success(PageState {
            page: page.unwrap_or(defaults.page).max(1),
            page_length: length.unwrap_or(defaults.page_length).max(1),
            sort_by,
            descending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_is_zero_based_from_one_based_pages() {
        let page = PageState {
            page: 3,
            page_length: 5,
            ..Default::default()
        };
        assert_eq!(page.skip(), 10);
        assert_eq!(page.limit(), 5);
    }

    #[test]
    fn direction_follows_order_flag() {
        let mut page = PageState::default();
        assert_eq!(page.direction(), 1);
        page.descending = true;
        assert_eq!(page.direction(), -1);
    }
}
