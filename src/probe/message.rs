use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version 3.0, sent as the second int32 of every startup-phase request.
pub const PROTOCOL_VERSION_3_0: u32 = 0x0003_0000;

/// `R` + the high bytes of an AuthenticationRequest length.
pub const AUTH_REQUEST_SIGNATURE: &[u8] = &[0x52, 0x00, 0x00, 0x00];

/// `E` + length + `SFATAL`: the ErrorResponse a server sends when the light
/// request carries no parameters.
pub const FATAL_ERROR_SIGNATURE: &[u8] = &[
    0x45, 0x00, 0x00, 0x00, 0x85, 0x53, 0x46, 0x41, 0x54, 0x41, 0x4c,
];

const SSL_REQUEST: &[u8] = &[0x00, 0x00, 0x00, 0x08, 0x00, 0x03, 0x00, 0x00];

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum ProbeShape {
    #[default]
    Startup,
    SslRequest,
}

impl fmt::Display for ProbeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeShape::Startup => write!(f, "startup"),
            ProbeShape::SslRequest => write!(f, "ssl-request"),
        }
    }
}

/// Values carried in the `user` and `database` startup parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StartupParams {
    pub user: String,
    pub database: String,
}

impl Default for StartupParams {
    fn default() -> Self {
        Self {
            user: "postgres".into(),
            database: "postgres".into(),
        }
    }
}

/// A fully encoded startup-phase request together with the response prefix
/// that identifies a PostgreSQL server answering it.
#[derive(Clone, Debug)]
pub struct ProbeMessage {
    shape: ProbeShape,
    bytes: Vec<u8>,
    signature: &'static [u8],
}

impl ProbeMessage {
    pub fn startup(params: &StartupParams) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&PROTOCOL_VERSION_3_0.to_be_bytes());
        push_param(&mut body, "user", &params.user);
        push_param(&mut body, "database", &params.database);
        body.push(0);

        let length = (body.len() + 4) as u32;
        let mut bytes = Vec::with_capacity(body.len() + 4);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&body);

        Self {
            shape: ProbeShape::Startup,
            bytes,
            signature: AUTH_REQUEST_SIGNATURE,
        }
    }

    pub fn ssl_request() -> Self {
        Self {
            shape: ProbeShape::SslRequest,
            bytes: SSL_REQUEST.to_vec(),
            signature: FATAL_ERROR_SIGNATURE,
        }
    }

    pub fn for_shape(shape: ProbeShape, params: &StartupParams) -> Self {
        match shape {
            ProbeShape::Startup => Self::startup(params),
            ProbeShape::SslRequest => Self::ssl_request(),
        }
    }

    pub fn shape(&self) -> ProbeShape {
        self.shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn signature(&self) -> &'static [u8] {
        self.signature
    }

    pub fn matches(&self, received: &[u8]) -> bool {
        received == self.signature
    }
}

fn push_param(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.extend_from_slice(key.as_bytes());
    buf.push(0);
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}
