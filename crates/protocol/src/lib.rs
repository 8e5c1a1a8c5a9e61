pub mod error_info;
pub mod filter;
pub mod lane_id;
pub mod page;

pub use error_info::{ErrorInfo, ErrorKind};
pub use filter::{FilterCriteria, FilterPatch};
pub use lane_id::LaneId;
pub use page::{DEFAULT_PAGE_SIZE, FetchMode, PageBatch, PageCursor, PageRequest};
