pub mod address;
pub mod error;
pub mod requests;
pub mod responses;


pub use address::Address;
pub use error::{Result, RpcError};
pub use requests::{next_request_id, Request, RequestId};
pub use responses::{Outcome, Response};
