use std::fmt;

use zbus::DBusError;

#[derive(Debug)]
pub enum Error {
    AlgorithmUnsupported(String),
    AliasUnsupported(String),
    Config(config::ConfigError),
    Crypto(String),
    InvalidArgs(String, String),
    NoSession(String),
    NoSuchObject(String),
    NotSupported(String),
    Store(rusqlite::Error),
    Zbus(zbus::Error),
    Zvariant(zvariant::Error),
}

impl DBusError for Error {
    fn create_reply(
        &self,
        msg: &zbus::message::Header<'_>,
    ) -> zbus::Result<zbus::message::Message> {
        let message = zbus::message::Message::error(msg, self.name())?
            .build(&self.description().unwrap_or(""))?;
        Ok(message)
    }

    fn name(&self) -> zbus_names::ErrorName<'_> {
        match self {
            Error::AlgorithmUnsupported(_) | Error::AliasUnsupported(_) | Error::NotSupported(_) => {
                zbus_names::ErrorName::from_static_str_unchecked(
                    "org.freedesktop.DBus.Error.NotSupported",
                )
            }
            Error::InvalidArgs(_, _) => zbus_names::ErrorName::from_static_str_unchecked(
                "org.freedesktop.DBus.Error.InvalidArgs",
            ),
            Error::NoSession(_) => zbus_names::ErrorName::from_static_str_unchecked(
                "org.freedesktop.Secret.Error.NoSession",
            ),
            // Although `org.freedesktop.DBus.Error.UnknownObject` would also work here,
            // the secret service spec defines a more precise error for these cases.
            // https://specifications.freedesktop.org/secret-service-spec/latest/errors.html#id-1.3.5.5
            Error::NoSuchObject(_) => zbus_names::ErrorName::from_static_str_unchecked(
                "org.freedesktop.Secret.Error.NoSuchObject",
            ),
            _ => zbus_names::ErrorName::from_static_str_unchecked("org.freedesktop.DBus.Error.Failed"),
        }
    }

    fn description(&self) -> Option<&str> {
        let description = format!("{}", self).leak();
        Some(description)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlgorithmUnsupported(algorithm) => write!(
                f,
                "Cannot open a session with unsupported algorithm: '{}'",
                algorithm
            ),
            Error::AliasUnsupported(alias) => {
                write!(f, "Cannot create a collection with alias: '{}'", alias)
            }
            Error::Config(inner) => write!(f, "{}", inner),
            Error::Crypto(msg) => write!(f, "Cryptographic operation failed: {}", msg),
            Error::InvalidArgs(method, msg) => {
                write!(f, "Invalid arguments received for '{}': {}", method, msg)
            }
            Error::NoSession(object_path) => {
                write!(f, "A session '{}' does not exist", object_path)
            }
            Error::NoSuchObject(object) => write!(f, "No such object exists: '{}'", object),
            Error::NotSupported(method) => write!(f, "'{}' is not supported by this daemon", method),
            Error::Store(inner) => write!(f, "{}", inner),
            Error::Zbus(inner) => write!(f, "{}", inner),
            Error::Zvariant(inner) => write!(f, "{}", inner),
        }
    }
}

impl From<Error> for zbus::fdo::Error {
    fn from(value: Error) -> zbus::fdo::Error {
        zbus::fdo::Error::Failed(format!("{}", value))
    }
}

impl From<zbus::Error> for Error {
    fn from(value: zbus::Error) -> Error {
        Error::Zbus(value)
    }
}

impl From<zvariant::Error> for Error {
    fn from(value: zvariant::Error) -> Error {
        Error::Zvariant(value)
    }
}

impl From<config::ConfigError> for Error {
    fn from(value: config::ConfigError) -> Error {
        Error::Config(value)
    }
}

impl From<hkdf::InvalidLength> for Error {
    fn from(value: hkdf::InvalidLength) -> Error {
        Error::Crypto(format!("{}", value))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Error {
        Error::Store(value)
    }
}
