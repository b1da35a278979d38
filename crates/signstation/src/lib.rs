//! SignStation API model and upstream calls
//!
//! Wire types shared by the signing workflow and the proxy service, plus the
//! three upstream interactions the proxy performs on behalf of callers:
//! 1. `token::request_token()` exchanges client credentials for a bearer token
//! 2. `documents::sign_document()` submits a PDF with signature placements
//! 3. `documents::document_download_url()` fetches a time-limited download URL
//!
//! Replies are returned as `UpstreamReply` (status + JSON body) so callers can
//! forward the provider's payload verbatim.

pub mod constants;
pub mod documents;
pub mod error;
pub mod reply;
pub mod token;
pub mod types;

pub use constants::*;
pub use documents::{SignForm, document_download_url, sign_document};
pub use error::{Error, Result};
pub use reply::UpstreamReply;
pub use token::request_token;
pub use types::{
    DownloadPayload, DownloadRequest, SignSubmission, SignatureCoordinate, TokenData,
    document_id_from_body, download_url_from_body, token_from_body,
};
