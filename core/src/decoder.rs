//! Response decoders: how a raw body becomes a typed value.
//!
//! # Design
//! Each response shape is its own type implementing `ResponseDecoder`, and a
//! pipeline is generic over the one it was built with, so the shape is fixed
//! at construction time instead of being probed at runtime.
//!
//! `Ok(None)` means "no value" and still reaches the success callback.
//! Only `JsonResponse` distinguishes a malformed body from an absent one by
//! returning `Err`, which the pipeline turns into a decode failure.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::config::JSON_CONTENT_TYPE;
use crate::error::DecodeError;

/// Strategy converting a raw response body into `Output`.
pub trait ResponseDecoder: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Value for the request's `Accept` header, if any.
    fn accept_type(&self) -> Option<&str> {
        None
    }

    fn decode(&self, body: Option<&[u8]>) -> Result<Option<Self::Output>, DecodeError>;
}

/// Ignores the body entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidResponse;

impl ResponseDecoder for VoidResponse {
    type Output = ();

    fn decode(&self, _body: Option<&[u8]>) -> Result<Option<()>, DecodeError> {
        Ok(None)
    }
}

/// Hands back the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataResponse;

impl ResponseDecoder for DataResponse {
    type Output = Vec<u8>;

    fn decode(&self, body: Option<&[u8]>) -> Result<Option<Vec<u8>>, DecodeError> {
        Ok(body.map(<[u8]>::to_vec))
    }
}

/// UTF-8 text; invalid UTF-8 yields no value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringResponse;

impl ResponseDecoder for StringResponse {
    type Output = String;

    fn decode(&self, body: Option<&[u8]>) -> Result<Option<String>, DecodeError> {
        Ok(body.and_then(|bytes| String::from_utf8(bytes.to_vec()).ok()))
    }
}

/// JSON body deserialized into `T`.
///
/// An absent or empty body is no value; anything else that fails to parse is
/// a `DecodeError`.
pub struct JsonResponse<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonResponse<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonResponse<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonResponse").finish()
    }
}

impl<T> ResponseDecoder for JsonResponse<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn accept_type(&self) -> Option<&str> {
        Some(JSON_CONTENT_TYPE)
    }

    fn decode(&self, body: Option<&[u8]>) -> Result<Option<T>, DecodeError> {
        match body {
            None => Ok(None),
            Some(bytes) if bytes.is_empty() => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        }
    }
}

/// Placeholder for callers that inspect the response through hooks rather
/// than a decoded value. Always yields no value.
pub struct RawResponse<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> RawResponse<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for RawResponse<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RawResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse").finish()
    }
}

impl<T: Send + 'static> ResponseDecoder for RawResponse<T> {
    type Output = T;

    fn decode(&self, _body: Option<&[u8]>) -> Result<Option<T>, DecodeError> {
        Ok(None)
    }
}
