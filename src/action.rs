//! Taint action summaries.
//!
//! An action maps a position whose taint state changes across a call to the
//! position whose pre-call state decides it, e.g. `return -> param-0`. Summaries
//! are local to one method; composing them along a chain is left to path search.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ActionError;

/// Position in the closed taint vocabulary.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Position {
    This,
    ThisField(String),
    Param(usize),
    Return,
}

impl Position {
    /// Check the position against the shape of the method it belongs to.
    pub(crate) fn check_scope(&self, scope: MethodScope) -> Result<(), ActionError> {
        match self {
            Position::Param(index) if *index >= scope.parameter_count => {
                Err(ActionError::ParamOutOfRange {
                    value: self.to_string(),
                    parameter_count: scope.parameter_count,
                })
            }
            Position::This | Position::ThisField(_) if scope.is_static => {
                Err(ActionError::NoReceiver {
                    value: self.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::This => f.write_str("this"),
            Position::ThisField(field) => write!(f, "this.{field}"),
            Position::Param(index) => write!(f, "param-{index}"),
            Position::Return => f.write_str("return"),
        }
    }
}

impl FromStr for Position {
    type Err = ActionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ActionError::InvalidPosition {
            value: value.to_string(),
        };
        match value {
            "this" => return Ok(Position::This),
            "return" => return Ok(Position::Return),
            _ => {}
        }
        if let Some(field) = value.strip_prefix("this.") {
            if field.split('.').all(is_field_segment) {
                return Ok(Position::ThisField(field.to_string()));
            }
            return Err(invalid());
        }
        if let Some(index) = value.strip_prefix("param-") {
            let canonical = !index.is_empty()
                && index.bytes().all(|b| b.is_ascii_digit())
                && (index == "0" || !index.starts_with('0'));
            if !canonical {
                return Err(invalid());
            }
            return index.parse().map(Position::Param).map_err(|_| invalid());
        }
        Err(invalid())
    }
}

fn is_field_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Parameter count and receiver presence of the method owning a summary.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MethodScope {
    pub(crate) parameter_count: usize,
    pub(crate) is_static: bool,
}

/// Validated action map: one value per key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ActionSet {
    entries: BTreeMap<Position, Position>,
}

impl ActionSet {
    pub(crate) fn insert(&mut self, key: Position, value: Position) -> Option<Position> {
        self.entries.insert(key, value)
    }

    /// Parse and validate a textual action before inserting it.
    pub(crate) fn insert_text(
        &mut self,
        key: &str,
        value: &str,
        scope: MethodScope,
    ) -> Result<(), ActionError> {
        let key: Position = key.parse()?;
        let value: Position = value.parse()?;
        key.check_scope(scope)?;
        value.check_scope(scope)?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub(crate) fn get(&self, key: &Position) -> Option<&Position> {
        self.entries.get(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Later summaries replace earlier values key by key.
    pub(crate) fn merge(&mut self, newer: &ActionSet) {
        for (key, value) in &newer.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub(crate) fn to_text_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    pub(crate) fn from_text_map(map: &BTreeMap<String, String>) -> Result<Self, ActionError> {
        let mut actions = ActionSet::default();
        for (key, value) in map {
            actions.insert(key.parse()?, value.parse()?);
        }
        Ok(actions)
    }
}

/// Parameter indices known to carry attacker data to a sink. Only ever grows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PollutedPositions(Vec<usize>);

impl PollutedPositions {
    pub(crate) fn insert(&mut self, index: usize, scope: MethodScope) -> Result<(), ActionError> {
        Position::Param(index).check_scope(scope)?;
        if !self.0.contains(&index) {
            self.0.push(index);
        }
        Ok(())
    }

    pub(crate) fn union(&mut self, other: &PollutedPositions) {
        for index in &other.0 {
            if !self.0.contains(index) {
                self.0.push(*index);
            }
        }
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub(crate) fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for PollutedPositions {
    fn from(indices: Vec<usize>) -> Self {
        let mut positions = PollutedPositions::default();
        for index in indices {
            if !positions.0.contains(&index) {
                positions.0.push(index);
            }
        }
        positions
    }
}
