//! JSON body extractor
//!
//! Like `axum::Json`, but a malformed body is reported through the error
//! envelope and a `danger` notification instead of axum's plain-text 4xx.

use axum::extract::{FromRequest, Request};
use axum::Json;
use deckhand_core::Error;
use serde::de::DeserializeOwned;

use super::response::ApiError;
use crate::server::AppState;

pub struct Payload<T>(pub T);

#[async_trait::async_trait]
impl<T> FromRequest<AppState> for Payload<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(state.fail(Error::validation(rejection.body_text()))),
        }
    }
}
