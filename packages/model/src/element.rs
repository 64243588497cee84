use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::path::StateId;

pub type PortId = u32;
pub type OutcomeId = i32;
pub type TransitionId = u32;
pub type DataFlowId = u32;

/// Presentation/layout annotations attached to an element (positions, sizes, colors...)
pub type Meta = BTreeMap<String, Value>;

pub const SUCCESS_OUTCOME: OutcomeId = 0;
pub const ABORTED_OUTCOME: OutcomeId = -1;
pub const PREEMPTED_OUTCOME: OutcomeId = -2;

/// The kind of a state. Every kind except [`StateKind::Execution`] can hold child states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Execution,
    Hierarchy,
    BarrierConcurrency,
    PreemptiveConcurrency,
}

impl StateKind {
    pub fn is_container(self) -> bool {
        self != StateKind::Execution
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// The kinds of elements a container can add or remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    State,
    InputPort,
    OutputPort,
    Outcome,
    ScopedVariable,
    Transition,
    DataFlow,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::State => "state",
            ElementKind::InputPort => "input_data_port",
            ElementKind::OutputPort => "output_data_port",
            ElementKind::Outcome => "outcome",
            ElementKind::ScopedVariable => "scoped_variable",
            ElementKind::Transition => "transition",
            ElementKind::DataFlow => "data_flow",
        }
    }

    /// Name of the collection property holding elements of this kind
    pub fn collection(self) -> &'static str {
        match self {
            ElementKind::State => "states",
            ElementKind::InputPort => "input_data_ports",
            ElementKind::OutputPort => "output_data_ports",
            ElementKind::Outcome => "outcomes",
            ElementKind::ScopedVariable => "scoped_variables",
            ElementKind::Transition => "transitions",
            ElementKind::DataFlow => "data_flows",
        }
    }

    pub fn port(direction: PortDirection) -> Self {
        match direction {
            PortDirection::Input => ElementKind::InputPort,
            PortDirection::Output => ElementKind::OutputPort,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPort {
    pub id: PortId,
    pub name: String,
    pub data_type: String,
    pub default_value: Value,
    #[serde(default)]
    pub meta: Meta,
}

impl DataPort {
    /// A port with no id yet; the owning state assigns one when it is added
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            data_type: data_type.into(),
            default_value: Value::Null,
            meta: Meta::new(),
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: OutcomeId,
    pub name: String,
    #[serde(default)]
    pub meta: Meta,
}

impl Outcome {
    pub fn new(id: OutcomeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            meta: Meta::new(),
        }
    }

    /// `aborted` and `preempted` exist on every state
    pub fn is_protected(&self) -> bool {
        self.id < 0
    }
}

/// Variable living in the scope of a container state. Shares its id space with the ports
/// of that state, so `(state id, key)` identifies a data flow endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedVariable {
    pub id: PortId,
    pub name: String,
    pub data_type: String,
    pub default_value: Value,
    #[serde(default)]
    pub meta: Meta,
}

impl ScopedVariable {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            data_type: data_type.into(),
            default_value: Value::Null,
            meta: Meta::new(),
        }
    }
}

/// Transition between two children of a container, from the container's start into a
/// child (`from_outcome` is `None`) or from a child into one of the container's own
/// outcomes (`to_state` is the container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub from_state: StateId,
    pub from_outcome: Option<OutcomeId>,
    pub to_state: StateId,
    pub to_outcome: Option<OutcomeId>,
    #[serde(default)]
    pub meta: Meta,
}

impl Transition {
    pub fn new(
        from_state: StateId,
        from_outcome: Option<OutcomeId>,
        to_state: StateId,
        to_outcome: Option<OutcomeId>,
    ) -> Self {
        Self {
            id: 0,
            from_state,
            from_outcome,
            to_state,
            to_outcome,
            meta: Meta::new(),
        }
    }

    pub fn touches_state(&self, state: &StateId) -> bool {
        &self.from_state == state || &self.to_state == state
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlow {
    pub id: DataFlowId,
    pub from_state: StateId,
    pub from_key: PortId,
    pub to_state: StateId,
    pub to_key: PortId,
    #[serde(default)]
    pub meta: Meta,
}

impl DataFlow {
    pub fn new(from_state: StateId, from_key: PortId, to_state: StateId, to_key: PortId) -> Self {
        Self {
            id: 0,
            from_state,
            from_key,
            to_state,
            to_key,
            meta: Meta::new(),
        }
    }

    pub fn touches_state(&self, state: &StateId) -> bool {
        &self.from_state == state || &self.to_state == state
    }

    pub fn touches_key(&self, state: &StateId, key: PortId) -> bool {
        (&self.from_state == state && self.from_key == key)
            || (&self.to_state == state && self.to_key == key)
    }
}

/// A state of the hierarchical state machine. Container states own their children
/// together with the transitions and data flows connecting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub name: String,
    pub kind: StateKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_ports: BTreeMap<PortId, DataPort>,
    #[serde(default)]
    pub output_ports: BTreeMap<PortId, DataPort>,
    pub outcomes: BTreeMap<OutcomeId, Outcome>,
    #[serde(default)]
    pub scoped_variables: BTreeMap<PortId, ScopedVariable>,
    #[serde(default)]
    pub states: BTreeMap<StateId, State>,
    #[serde(default)]
    pub transitions: BTreeMap<TransitionId, Transition>,
    #[serde(default)]
    pub data_flows: BTreeMap<DataFlowId, DataFlow>,
    #[serde(default)]
    pub start_state: Option<StateId>,
    #[serde(default)]
    pub meta: Meta,
    /// Next id handed out to a port, scoped variable, transition or data flow
    next_element_id: u32,
}

impl State {
    /// Create a state with the default outcomes `success`, `aborted` and `preempted`
    pub fn new(id: StateId, name: impl Into<String>, kind: StateKind) -> Self {
        let mut outcomes = BTreeMap::new();
        for (outcome_id, outcome_name) in [
            (SUCCESS_OUTCOME, "success"),
            (ABORTED_OUTCOME, "aborted"),
            (PREEMPTED_OUTCOME, "preempted"),
        ] {
            outcomes.insert(outcome_id, Outcome::new(outcome_id, outcome_name));
        }

        Self {
            id,
            name: name.into(),
            kind,
            description: None,
            input_ports: BTreeMap::new(),
            output_ports: BTreeMap::new(),
            outcomes,
            scoped_variables: BTreeMap::new(),
            states: BTreeMap::new(),
            transitions: BTreeMap::new(),
            data_flows: BTreeMap::new(),
            start_state: None,
            meta: Meta::new(),
            next_element_id: 1,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    pub fn child(&self, id: &StateId) -> Option<&State> {
        self.states.get(id)
    }

    pub fn ports(&self, direction: PortDirection) -> &BTreeMap<PortId, DataPort> {
        match direction {
            PortDirection::Input => &self.input_ports,
            PortDirection::Output => &self.output_ports,
        }
    }

    pub(crate) fn ports_mut(&mut self, direction: PortDirection) -> &mut BTreeMap<PortId, DataPort> {
        match direction {
            PortDirection::Input => &mut self.input_ports,
            PortDirection::Output => &mut self.output_ports,
        }
    }

    /// Whether `key` names one of this state's ports or scoped variables
    pub fn has_key(&self, key: PortId) -> bool {
        self.input_ports.contains_key(&key)
            || self.output_ports.contains_key(&key)
            || self.scoped_variables.contains_key(&key)
    }

    /// Total number of states in this subtree, including this one
    pub fn subtree_len(&self) -> usize {
        1 + self.states.values().map(State::subtree_len).sum::<usize>()
    }

    pub(crate) fn allocate_element_id(&mut self) -> u32 {
        let id = self.next_element_id;
        self.next_element_id += 1;
        id
    }

    pub(crate) fn allocate_outcome_id(&mut self) -> OutcomeId {
        self.outcomes
            .keys()
            .copied()
            .max()
            .map_or(1, |max| (max + 1).max(1))
    }
}
