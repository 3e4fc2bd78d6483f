//! Which bodies a `ModBody` request targets

use std::fmt;
use std::str::FromStr;

use crate::error::ControlError;
use crate::simulation::body::{Body, BodyId};

/// Match bodies by id, exact name or class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(BodyId),
    Name(String),
    Class(String),
}

impl Selector {
    pub fn matches(&self, body: &Body) -> bool {
        match self {
            Selector::Id(id) => body.id() == *id,
            Selector::Name(name) => body.name() == Some(name.as_str()),
            Selector::Class(class) => body.class() == Some(class.as_str()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Id(id) => write!(f, "id={id}"),
            Selector::Name(name) => write!(f, "name={name}"),
            Selector::Class(class) => write!(f, "class={class}"),
        }
    }
}

impl FromStr for Selector {
    type Err = ControlError;

    /// `id=<n>`, `name=<s>` or `class=<s>`; the kind is case-insensitive,
    /// the value is matched exactly
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ControlError::BadSelector(s.to_string());
        let (kind, value) = s.split_once('=').ok_or_else(bad)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(bad());
        }
        match kind.trim().to_ascii_lowercase().as_str() {
            "id" => value.parse().map(|id| Selector::Id(BodyId(id))).map_err(|_| bad()),
            "name" => Ok(Selector::Name(value.to_string())),
            "class" => Ok(Selector::Class(value.to_string())),
            _ => Err(bad()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_kinds() {
        assert_eq!("id=7".parse::<Selector>().unwrap(), Selector::Id(BodyId(7)));
        assert_eq!("Name=sun".parse::<Selector>().unwrap(), Selector::Name("sun".into()));
        assert_eq!("class = asteroid".parse::<Selector>().unwrap(), Selector::Class("asteroid".into()));
    }

    #[test]
    fn rejects_unknown_or_malformed() {
        assert!(matches!("colour=red".parse::<Selector>(), Err(ControlError::BadSelector(_))));
        assert!("id=seven".parse::<Selector>().is_err());
        assert!("name=".parse::<Selector>().is_err());
        assert!("sun".parse::<Selector>().is_err());
    }
}
