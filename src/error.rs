// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type for congestion control operations.

use strum_macros::EnumIter;

/// QUIC transport error code for INTERNAL_ERROR.
/// See RFC 9000 Section 20.1
const INTERNAL_ERROR: u64 = 0x1;

/// Congestion control error.
///
/// `Overflow`, `Underflow` and `InvalidState` are fatal for the connection
/// that raised them: the byte accounting can no longer be trusted and the
/// caller is expected to close the connection.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// An addition would exceed the representable counter range, for instance
    /// the bytes in flight on send or the credit balance on ack.
    Overflow(String),

    /// A subtraction would go below zero. Only raised for bytes in flight,
    /// the credit balance saturates instead.
    Underflow(String),

    /// The operation cannot be completed because it was attempted in an
    /// invalid state.
    InvalidState(String),

    /// The configuration is invalid.
    InvalidConfig(String),
}

impl Error {
    /// Return the transport error code the connection should be closed with.
    /// See RFC 9000 Section 20.1
    pub fn to_wire(&self) -> u64 {
        match *self {
            Error::Overflow(_) | Error::Underflow(_) | Error::InvalidState(_) => INTERNAL_ERROR,
            Error::InvalidConfig(_) => 0x0,
        }
    }

    /// Whether the error must abort the connection.
    pub fn is_fatal(&self) -> bool {
        self.to_wire() != 0
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(format!("{}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn error_to_wire() {
        for err in Error::iter() {
            match err {
                Error::InvalidConfig(_) => {
                    assert_eq!(err.to_wire(), 0);
                    assert!(!err.is_fatal());
                }
                _ => {
                    assert_eq!(err.to_wire(), INTERNAL_ERROR);
                    assert!(err.is_fatal());
                }
            }
        }
    }

    #[test]
    fn json_error() {
        use std::error::Error;
        let e = serde_json::from_str::<u64>("x").unwrap_err();
        let e = super::Error::from(e);

        assert!(matches!(e, super::Error::InvalidConfig(_)));
        assert!(format!("{}", e).starts_with("InvalidConfig("));
        assert!(e.source().is_none());
    }

    #[test]
    fn error_display() {
        let e = super::Error::Underflow("inflight 10 - 20".into());
        assert_eq!(format!("{}", e), "Underflow(\"inflight 10 - 20\")");
    }
}
