//! Errors raised while loading a scenario.

use derive_more::{Display, From};

pub type ScenarioResult<T> = Result<T, ScenarioError>;

#[derive(Display, Debug, From)]
#[display("{kind}")]
pub struct ScenarioError {
    #[from]
    kind: Box<ScenarioErrorKind>,
}

impl<E> From<E> for ScenarioError
where
    ScenarioErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        ScenarioError {
            kind: Box::new(ScenarioErrorKind::from(error)),
        }
    }
}

impl ScenarioError {
    pub fn kind(&self) -> &ScenarioErrorKind {
        &self.kind
    }

    pub(crate) fn unknown_type(name: &str) -> Self {
        ScenarioErrorKind::UnknownType(name.to_owned()).into()
    }

    pub(crate) fn unknown_protocol(name: &str) -> Self {
        ScenarioErrorKind::UnknownProtocol(name.to_owned()).into()
    }

    pub(crate) fn unknown_type_var(name: &str) -> Self {
        ScenarioErrorKind::UnknownTypeVar(name.to_owned()).into()
    }

    pub(crate) fn unknown_value(name: &str) -> Self {
        ScenarioErrorKind::UnknownValue(name.to_owned()).into()
    }

    pub(crate) fn unknown_context(name: &str) -> Self {
        ScenarioErrorKind::UnknownContext(name.to_owned()).into()
    }

    pub(crate) fn unknown_generic_param(name: &str) -> Self {
        ScenarioErrorKind::UnknownGenericParam(name.to_owned()).into()
    }

    pub(crate) fn unknown_assoc_type(base: &str, name: &str) -> Self {
        ScenarioErrorKind::UnknownAssocType {
            base: base.to_owned(),
            name: name.to_owned(),
        }
        .into()
    }

    pub(crate) fn duplicate(what: &'static str, name: &str) -> Self {
        ScenarioErrorKind::DuplicateName {
            what,
            name: name.to_owned(),
        }
        .into()
    }

    pub(crate) fn generic_not_function(value: &str) -> Self {
        ScenarioErrorKind::GenericNotFunction(value.to_owned()).into()
    }
}

#[derive(Display, Debug)]
pub enum ScenarioErrorKind {
    #[display("Cannot read scenario: {_0}")]
    Io(std::io::Error),

    #[display("Malformed scenario: {_0}")]
    Json(serde_json::Error),

    #[display("Unknown type: {_0}")]
    UnknownType(String),

    #[display("Unknown protocol: {_0}")]
    UnknownProtocol(String),

    #[display("Unknown type variable: {_0}")]
    UnknownTypeVar(String),

    #[display("Unknown value: {_0}")]
    UnknownValue(String),

    #[display("Unknown declaration context: {_0}")]
    UnknownContext(String),

    #[display("Unknown generic parameter: {_0}")]
    UnknownGenericParam(String),

    #[display("No associated type {name} on {base}")]
    UnknownAssocType { base: String, name: String },

    #[display("Duplicate {what}: {name}")]
    DuplicateName { what: &'static str, name: String },

    #[display("Generic value {_0} must have a function type")]
    GenericNotFunction(String),
}

impl From<std::io::Error> for ScenarioErrorKind {
    fn from(error: std::io::Error) -> Self {
        ScenarioErrorKind::Io(error)
    }
}

impl From<serde_json::Error> for ScenarioErrorKind {
    fn from(error: serde_json::Error) -> Self {
        ScenarioErrorKind::Json(error)
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.kind {
            ScenarioErrorKind::Io(e) => Some(e),
            ScenarioErrorKind::Json(e) => Some(e),
            _ => None,
        }
    }
}
