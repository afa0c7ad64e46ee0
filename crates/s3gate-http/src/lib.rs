//! The S3 wire surface of the s3gate gateway.
//!
//! - [`request`] - parsing an HTTP request into an [`S3Request`](request::S3Request)
//!   with its canonical action string and resource ARN
//! - [`error`] - mapping internal deny reasons to S3 wire errors and
//!   building the XML error responses
//! - [`xml`] - the S3 `<Error>` document writer
//! - [`body`] - the response body type, buffered or streamed

pub mod body;
pub mod error;
pub mod request;
pub mod xml;

pub use body::GatewayBody;
pub use error::{deny_response, s3_error_response};
pub use request::S3Request;
