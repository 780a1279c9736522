//! Success envelope shared by every JSON endpoint.

use axum::Json;
use serde::Serialize;

/// `{code: 0, msg, data}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub msg: String,
    pub data: T,
}

pub fn success<T: Serialize>(msg: impl Into<String>, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        code: 0,
        msg: msg.into(),
        data,
    })
}
