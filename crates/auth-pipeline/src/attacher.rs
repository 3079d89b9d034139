//! Credential attacher
//!
//! Stamps outbound descriptors with the bearer credential. Reading the
//! credential from storage is the caller's job, so this stays pure.

use common::Secret;
use transport::RequestDescriptor;
use transport::descriptor::BEARER_PREFIX;
use transport::header::{AUTHORIZATION, HeaderValue};
use tracing::warn;

/// Set `Authorization: Bearer <credential>` on `descriptor`.
///
/// With no credential the descriptor is returned unmodified. A credential that
/// cannot be represented as a header value is skipped with a warning.
pub fn attach(mut descriptor: RequestDescriptor, credential: Option<&Secret<String>>) -> RequestDescriptor {
    let Some(credential) = credential else {
        return descriptor;
    };

    match HeaderValue::from_str(&format!("{BEARER_PREFIX}{}", credential.expose())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            descriptor.headers.insert(AUTHORIZATION, value);
        }
        Err(e) => {
            warn!(request_id = %descriptor.id, error = %e, "credential is not a valid header value, sending without it");
        }
    }
    descriptor
}
