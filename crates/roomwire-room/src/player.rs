use roomwire_protocol::{Dict, PlayerId, Value};

/// A member of the room and its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub props: Dict,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, props: Dict) -> Self {
        Self {
            id: id.into(),
            props,
        }
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Overwrites the given keys; keys not in `changed` are kept.
    pub(crate) fn merge_props(&mut self, changed: &Dict) {
        for (key, value) in changed {
            self.props.insert(key.clone(), value.clone());
        }
    }
}
