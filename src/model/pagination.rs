use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};
use serde::{Deserialize, Serialize};

/// Largest page a client may request in one call.
const MAX_PAGE_SIZE: usize = 500;

/// Pagination query parameters (`page_num`, `page_size`), defaulting to the
/// first page of 50. Queries are restartable: re-issuing the same request
/// with an incremented `page_num` continues where the previous page ended.
pub struct Pagination {
    page_num: usize,
    page_size: usize,
}

impl Pagination {
    pub fn page_num(&self) -> usize {
        self.page_num
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of documents to skip.
    pub fn skip(&self) -> u64 {
        ((self.page_num - 1) * self.page_size) as u64
    }

    /// Page size as a query limit.
    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    /// Consume into response metadata for the given total match count.
    pub fn meta(self, total: u64) -> PaginationMeta {
        PaginationMeta {
            page_num: self.page_num,
            page_size: self.page_size,
            total,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Pagination {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let page_num = match req.query_value::<usize>("page_num").unwrap_or(Ok(1)) {
            Ok(page_num) if page_num > 0 => page_num,
            _ => return request::Outcome::Failure((Status::BadRequest, ())),
        };
        let page_size = match req.query_value::<usize>("page_size").unwrap_or(Ok(50)) {
            Ok(page_size) if (1..=MAX_PAGE_SIZE).contains(&page_size) => page_size,
            _ => return request::Outcome::Failure((Status::BadRequest, ())),
        };
        request::Outcome::Success(Self {
            page_num,
            page_size,
        })
    }
}

/// Echo of the pagination request plus the total match count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page_num: usize,
    pub page_size: usize,
    pub total: u64,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}
