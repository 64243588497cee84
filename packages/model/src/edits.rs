//! # Observed Edits
//!
//! Every mutator of a [`Document`] that the history can record. Each one reports an outer
//! before/after pair to the observer it is handed; cascaded side effects (removing the
//! transitions of a removed state, the data flows of a removed port, ...) go through the
//! same mutators and therefore show up as nested pairs.
//!
//! ## Failure semantics
//!
//! The `after` notification is delivered even when the edit body fails, carrying the
//! error. A body error takes precedence over observer errors when both happen.

use serde_json::Value;
use tracing::trace;

use crate::document::Document;
use crate::element::{
    DataFlow, DataFlowId, DataPort, ElementKind, OutcomeId, Outcome, PortDirection, PortId,
    ScopedVariable, State, StateKind, Transition, TransitionId,
};
use crate::error::{ModelError, ModelResult};
use crate::notification::{ChangeNotice, ChangeObserver, EditTarget, MetaChange, MetaMode, Operation};
use crate::path::{StateId, StatePath};

impl Document {
    /// Run `body` between a before and an after notification
    fn observed<T>(
        &mut self,
        observer: &mut dyn ChangeObserver,
        notice: ChangeNotice,
        body: impl FnOnce(&mut Document, &mut dyn ChangeObserver) -> ModelResult<T>,
    ) -> ModelResult<T> {
        trace!(cause = %notice.cause(), target = %notice.target, "before");
        if let Err(rejection) = observer.before(self, &notice) {
            // a rejected edit is not applied; the observer still sees its pair closed
            let err = ModelError::Observer(rejection);
            trace!(cause = %notice.cause(), error = %err, "rejected");
            if let Err(after) = observer.after(self, &notice, Err(&err)) {
                trace!(cause = %notice.cause(), error = %after, "after of a rejected edit failed");
            }
            return Err(err);
        }

        let result = body(self, &mut *observer);
        if result.is_ok() {
            self.mark_dirty();
        }

        trace!(cause = %notice.cause(), ok = result.is_ok(), "after");
        let after = observer.after(self, &notice, result.as_ref().map(|_| ()));

        let value = result?;
        after.map_err(ModelError::Observer)?;
        Ok(value)
    }

    // ---- states ----

    pub fn add_state(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        state: State,
    ) -> ModelResult<StatePath> {
        let path = container.child(state.id.clone());
        self.observed(
            observer,
            ChangeNotice::add(container.clone(), ElementKind::State),
            move |doc, _| {
                let parent = doc.container_mut(container)?;
                if parent.states.contains_key(&state.id) {
                    return Err(ModelError::duplicate_element(
                        container,
                        format!("state {}", state.id),
                    ));
                }
                parent.states.insert(state.id.clone(), state);
                Ok(path)
            },
        )
    }

    /// Add a new, empty state with a generated id
    pub fn create_state(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        name: impl Into<String>,
        kind: StateKind,
    ) -> ModelResult<StatePath> {
        let id = self.new_state_id();
        self.add_state(observer, container, State::new(id, name, kind))
    }

    /// Remove a state together with every transition and data flow connected to it
    pub fn remove_state(
        &mut self,
        observer: &mut dyn ChangeObserver,
        path: &StatePath,
    ) -> ModelResult<State> {
        let container = path.parent().ok_or(ModelError::RootRemoval)?;
        let child_id = path.last().clone();

        self.observed(
            observer,
            ChangeNotice::remove(container.clone(), ElementKind::State),
            |doc, observer| {
                let parent = doc.state(&container)?;
                if !parent.states.contains_key(&child_id) {
                    return Err(ModelError::StateNotFound(path.to_string()));
                }
                let transitions: Vec<TransitionId> = parent
                    .transitions
                    .values()
                    .filter(|t| t.touches_state(&child_id))
                    .map(|t| t.id)
                    .collect();
                let flows: Vec<DataFlowId> = parent
                    .data_flows
                    .values()
                    .filter(|f| f.touches_state(&child_id))
                    .map(|f| f.id)
                    .collect();

                for id in transitions {
                    doc.remove_transition(observer, &container, id)?;
                }
                for id in flows {
                    doc.remove_data_flow(observer, &container, id)?;
                }

                let parent = doc.state_mut(&container)?;
                if parent.start_state.as_ref() == Some(&child_id) {
                    parent.start_state = None;
                }
                parent
                    .states
                    .remove(&child_id)
                    .ok_or_else(|| ModelError::StateNotFound(path.to_string()))
            },
        )
    }

    pub fn set_state_name(
        &mut self,
        observer: &mut dyn ChangeObserver,
        path: &StatePath,
        name: impl Into<String>,
    ) -> ModelResult<()> {
        let name = name.into();
        self.observed(
            observer,
            ChangeNotice::modify(EditTarget::state(path.clone()), "name"),
            |doc, _| {
                doc.state_mut(path)?.name = name;
                Ok(())
            },
        )
    }

    pub fn set_state_description(
        &mut self,
        observer: &mut dyn ChangeObserver,
        path: &StatePath,
        description: Option<String>,
    ) -> ModelResult<()> {
        self.observed(
            observer,
            ChangeNotice::modify(EditTarget::state(path.clone()), "description"),
            |doc, _| {
                doc.state_mut(path)?.description = description;
                Ok(())
            },
        )
    }

    /// Set (or clear) the child a container starts with
    pub fn set_start_state(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        start: Option<StateId>,
    ) -> ModelResult<()> {
        self.observed(
            observer,
            ChangeNotice::modify(EditTarget::state(container.clone()), "start_state_id"),
            |doc, _| {
                let state = doc.container_mut(container)?;
                if let Some(id) = &start {
                    if !state.states.contains_key(id) {
                        return Err(ModelError::StateNotFound(container.child(id.clone()).to_string()));
                    }
                }
                state.start_state = start;
                Ok(())
            },
        )
    }

    /// Replace the root state by one of another kind.
    ///
    /// When the new kind cannot hold children, the children and everything connecting
    /// them are removed first, each with its own nested notification.
    pub fn change_root_state_type(
        &mut self,
        observer: &mut dyn ChangeObserver,
        kind: StateKind,
    ) -> ModelResult<()> {
        self.observed(
            observer,
            ChangeNotice::new(EditTarget::StateMachine, "root_state", Operation::ChangeRootStateType),
            |doc, observer| {
                let root_path = doc.root_path();
                if !kind.is_container() {
                    let children: Vec<StateId> = doc.root().states.keys().cloned().collect();
                    for id in children {
                        doc.remove_state(observer, &root_path.child(id))?;
                    }
                    let transitions: Vec<TransitionId> =
                        doc.root().transitions.keys().copied().collect();
                    for id in transitions {
                        doc.remove_transition(observer, &root_path, id)?;
                    }
                    let flows: Vec<DataFlowId> = doc.root().data_flows.keys().copied().collect();
                    for id in flows {
                        doc.remove_data_flow(observer, &root_path, id)?;
                    }
                    let variables: Vec<PortId> = doc.root().scoped_variables.keys().copied().collect();
                    for id in variables {
                        doc.remove_scoped_variable(observer, &root_path, id)?;
                    }
                }

                doc.observed(
                    observer,
                    ChangeNotice::modify(EditTarget::state(root_path.clone()), "state_type"),
                    |doc, _| {
                        let root_path = doc.root_path();
                        let root = doc.state_mut(&root_path)?;
                        root.kind = kind;
                        if !kind.is_container() {
                            root.start_state = None;
                        }
                        Ok(())
                    },
                )
            },
        )
    }

    // ---- outcomes ----

    pub fn add_outcome(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        name: impl Into<String>,
    ) -> ModelResult<OutcomeId> {
        let name = name.into();
        self.observed(
            observer,
            ChangeNotice::add(owner.clone(), ElementKind::Outcome),
            |doc, _| {
                let state = doc.state_mut(owner)?;
                if state.outcomes.values().any(|o| o.name == name) {
                    return Err(ModelError::duplicate_element(owner, format!("outcome {:?}", name)));
                }
                let id = state.allocate_outcome_id();
                state.outcomes.insert(id, Outcome::new(id, name));
                Ok(id)
            },
        )
    }

    /// Remove an outcome and the transitions leaving or entering through it.
    /// `aborted` and `preempted` cannot be removed.
    pub fn remove_outcome(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        id: OutcomeId,
    ) -> ModelResult<Outcome> {
        self.observed(
            observer,
            ChangeNotice::remove(owner.clone(), ElementKind::Outcome),
            |doc, observer| {
                let state = doc.state(owner)?;
                let outcome = state
                    .outcomes
                    .get(&id)
                    .ok_or_else(|| ModelError::element_not_found(owner, format!("outcome {}", id)))?;
                if outcome.is_protected() {
                    return Err(ModelError::ProtectedOutcome(id));
                }

                let inner: Vec<TransitionId> = state
                    .transitions
                    .values()
                    .filter(|t| t.to_state == state.id && t.to_outcome == Some(id))
                    .map(|t| t.id)
                    .collect();
                let container = owner.parent();
                let outer: Vec<TransitionId> = match &container {
                    Some(container) => doc
                        .state(container)?
                        .transitions
                        .values()
                        .filter(|t| &t.from_state == owner.last() && t.from_outcome == Some(id))
                        .map(|t| t.id)
                        .collect(),
                    None => Vec::new(),
                };

                for transition in inner {
                    doc.remove_transition(observer, owner, transition)?;
                }
                if let Some(container) = &container {
                    for transition in outer {
                        doc.remove_transition(observer, container, transition)?;
                    }
                }

                doc.state_mut(owner)?
                    .outcomes
                    .remove(&id)
                    .ok_or_else(|| ModelError::element_not_found(owner, format!("outcome {}", id)))
            },
        )
    }

    pub fn set_outcome_name(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        id: OutcomeId,
        name: impl Into<String>,
    ) -> ModelResult<()> {
        let name = name.into();
        let target = EditTarget::Outcome {
            owner: owner.clone(),
            id,
        };
        self.observed(observer, ChangeNotice::modify(target, "name"), |doc, _| {
            let outcome = doc
                .state_mut(owner)?
                .outcomes
                .get_mut(&id)
                .ok_or_else(|| ModelError::element_not_found(owner, format!("outcome {}", id)))?;
            outcome.name = name;
            Ok(())
        })
    }

    // ---- data ports ----

    pub fn add_port(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        direction: PortDirection,
        mut port: DataPort,
    ) -> ModelResult<PortId> {
        self.observed(
            observer,
            ChangeNotice::add(owner.clone(), ElementKind::port(direction)),
            |doc, _| {
                let state = doc.state_mut(owner)?;
                if state.ports(direction).values().any(|p| p.name == port.name) {
                    return Err(ModelError::duplicate_element(owner, format!("port {:?}", port.name)));
                }
                port.id = state.allocate_element_id();
                let id = port.id;
                state.ports_mut(direction).insert(id, port);
                Ok(id)
            },
        )
    }

    pub fn add_input_port(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> ModelResult<PortId> {
        self.add_port(observer, owner, PortDirection::Input, DataPort::new(name, data_type))
    }

    pub fn add_output_port(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> ModelResult<PortId> {
        self.add_port(observer, owner, PortDirection::Output, DataPort::new(name, data_type))
    }

    /// Remove a port and the data flows attached to it, inside the owner as well as in
    /// the owner's container
    pub fn remove_port(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        direction: PortDirection,
        id: PortId,
    ) -> ModelResult<DataPort> {
        let missing = move || ModelError::element_not_found(owner, format!("port {}", id));
        self.observed(
            observer,
            ChangeNotice::remove(owner.clone(), ElementKind::port(direction)),
            |doc, observer| {
                let state = doc.state(owner)?;
                if !state.ports(direction).contains_key(&id) {
                    return Err(missing());
                }
                let inner = flows_touching(state, owner.last(), id);
                let container = owner.parent();
                let outer = match &container {
                    Some(container) => flows_touching(doc.state(container)?, owner.last(), id),
                    None => Vec::new(),
                };

                for flow in inner {
                    doc.remove_data_flow(observer, owner, flow)?;
                }
                if let Some(container) = &container {
                    for flow in outer {
                        doc.remove_data_flow(observer, container, flow)?;
                    }
                }

                doc.state_mut(owner)?
                    .ports_mut(direction)
                    .remove(&id)
                    .ok_or_else(missing)
            },
        )
    }

    pub fn set_port_name(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        direction: PortDirection,
        id: PortId,
        name: impl Into<String>,
    ) -> ModelResult<()> {
        let name = name.into();
        self.modify_port(observer, owner, direction, id, "name", |port| port.name = name)
    }

    pub fn set_port_data_type(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        direction: PortDirection,
        id: PortId,
        data_type: impl Into<String>,
    ) -> ModelResult<()> {
        let data_type = data_type.into();
        self.modify_port(observer, owner, direction, id, "data_type", |port| {
            port.data_type = data_type
        })
    }

    pub fn set_port_default_value(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        direction: PortDirection,
        id: PortId,
        value: Value,
    ) -> ModelResult<()> {
        self.modify_port(observer, owner, direction, id, "default_value", |port| {
            port.default_value = value
        })
    }

    fn modify_port(
        &mut self,
        observer: &mut dyn ChangeObserver,
        owner: &StatePath,
        direction: PortDirection,
        id: PortId,
        property: &'static str,
        update: impl FnOnce(&mut DataPort),
    ) -> ModelResult<()> {
        let target = EditTarget::Port {
            owner: owner.clone(),
            direction,
            id,
        };
        self.observed(observer, ChangeNotice::modify(target, property), |doc, _| {
            let port = doc
                .state_mut(owner)?
                .ports_mut(direction)
                .get_mut(&id)
                .ok_or_else(|| ModelError::element_not_found(owner, format!("port {}", id)))?;
            update(port);
            Ok(())
        })
    }

    // ---- scoped variables ----

    pub fn add_scoped_variable(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        mut variable: ScopedVariable,
    ) -> ModelResult<PortId> {
        self.observed(
            observer,
            ChangeNotice::add(container.clone(), ElementKind::ScopedVariable),
            |doc, _| {
                let state = doc.container_mut(container)?;
                variable.id = state.allocate_element_id();
                let id = variable.id;
                state.scoped_variables.insert(id, variable);
                Ok(id)
            },
        )
    }

    pub fn remove_scoped_variable(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        id: PortId,
    ) -> ModelResult<ScopedVariable> {
        let missing = move || ModelError::element_not_found(container, format!("scoped variable {}", id));
        self.observed(
            observer,
            ChangeNotice::remove(container.clone(), ElementKind::ScopedVariable),
            |doc, observer| {
                let state = doc.state(container)?;
                if !state.scoped_variables.contains_key(&id) {
                    return Err(missing());
                }
                for flow in flows_touching(state, container.last(), id) {
                    doc.remove_data_flow(observer, container, flow)?;
                }
                doc.state_mut(container)?
                    .scoped_variables
                    .remove(&id)
                    .ok_or_else(missing)
            },
        )
    }

    pub fn set_scoped_variable_name(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        id: PortId,
        name: impl Into<String>,
    ) -> ModelResult<()> {
        let name = name.into();
        let target = EditTarget::ScopedVariable {
            container: container.clone(),
            id,
        };
        self.observed(observer, ChangeNotice::modify(target, "name"), |doc, _| {
            let variable = doc
                .state_mut(container)?
                .scoped_variables
                .get_mut(&id)
                .ok_or_else(|| {
                    ModelError::element_not_found(container, format!("scoped variable {}", id))
                })?;
            variable.name = name;
            Ok(())
        })
    }

    // ---- transitions ----

    pub fn add_transition(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        mut transition: Transition,
    ) -> ModelResult<TransitionId> {
        self.observed(
            observer,
            ChangeNotice::add(container.clone(), ElementKind::Transition),
            |doc, _| {
                let state = doc.container_mut(container)?;
                validate_transition(state, &transition, None)?;
                transition.id = state.allocate_element_id();
                let id = transition.id;
                state.transitions.insert(id, transition);
                Ok(id)
            },
        )
    }

    pub fn remove_transition(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        id: TransitionId,
    ) -> ModelResult<Transition> {
        self.observed(
            observer,
            ChangeNotice::remove(container.clone(), ElementKind::Transition),
            |doc, _| {
                doc.state_mut(container)?
                    .transitions
                    .remove(&id)
                    .ok_or_else(|| ModelError::element_not_found(container, format!("transition {}", id)))
            },
        )
    }

    /// Point an existing transition somewhere else
    pub fn set_transition_target(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        id: TransitionId,
        to_state: StateId,
        to_outcome: Option<OutcomeId>,
    ) -> ModelResult<()> {
        let target = EditTarget::Transition {
            container: container.clone(),
            id,
        };
        self.observed(observer, ChangeNotice::modify(target, "to_state"), |doc, _| {
            let state = doc.state_mut(container)?;
            let mut updated = state
                .transitions
                .get(&id)
                .cloned()
                .ok_or_else(|| ModelError::element_not_found(container, format!("transition {}", id)))?;
            updated.to_state = to_state;
            updated.to_outcome = to_outcome;
            validate_transition(state, &updated, Some(id))?;
            state.transitions.insert(id, updated);
            Ok(())
        })
    }

    // ---- data flows ----

    pub fn add_data_flow(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        mut flow: DataFlow,
    ) -> ModelResult<DataFlowId> {
        self.observed(
            observer,
            ChangeNotice::add(container.clone(), ElementKind::DataFlow),
            |doc, _| {
                let state = doc.container_mut(container)?;
                validate_data_flow(state, &flow)?;
                flow.id = state.allocate_element_id();
                let id = flow.id;
                state.data_flows.insert(id, flow);
                Ok(id)
            },
        )
    }

    pub fn remove_data_flow(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        id: DataFlowId,
    ) -> ModelResult<DataFlow> {
        self.observed(
            observer,
            ChangeNotice::remove(container.clone(), ElementKind::DataFlow),
            |doc, _| {
                doc.state_mut(container)?
                    .data_flows
                    .remove(&id)
                    .ok_or_else(|| ModelError::element_not_found(container, format!("data flow {}", id)))
            },
        )
    }

    pub fn set_data_flow_target(
        &mut self,
        observer: &mut dyn ChangeObserver,
        container: &StatePath,
        id: DataFlowId,
        to_state: StateId,
        to_key: PortId,
    ) -> ModelResult<()> {
        let target = EditTarget::DataFlow {
            container: container.clone(),
            id,
        };
        self.observed(observer, ChangeNotice::modify(target, "to_state"), |doc, _| {
            let state = doc.state_mut(container)?;
            let mut updated = state
                .data_flows
                .get(&id)
                .cloned()
                .ok_or_else(|| ModelError::element_not_found(container, format!("data flow {}", id)))?;
            updated.to_state = to_state;
            updated.to_key = to_key;
            validate_data_flow(state, &updated)?;
            state.data_flows.insert(id, updated);
            Ok(())
        })
    }

    // ---- meta ----

    /// Set one meta annotation entry. Reported after the fact, with the complete meta
    /// map before and after the change.
    pub fn set_meta(
        &mut self,
        observer: &mut dyn ChangeObserver,
        target: EditTarget,
        key: impl Into<String>,
        value: Value,
        mode: MetaMode,
    ) -> ModelResult<()> {
        let meta = self.element_meta_mut(&target)?;
        let before = meta.clone();
        meta.insert(key.into(), value);
        let after = meta.clone();
        self.mark_dirty();

        let change = MetaChange {
            target,
            before,
            after,
            mode,
        };
        observer
            .meta_changed(self, &change)
            .map_err(ModelError::Observer)
    }
}

fn flows_touching(state: &State, owner: &StateId, key: PortId) -> Vec<DataFlowId> {
    state
        .data_flows
        .values()
        .filter(|f| f.touches_key(owner, key))
        .map(|f| f.id)
        .collect()
}

/// A transition either starts the container (from the container itself, no outcome) or
/// leaves a child through one of its outcomes. It ends in a child or in one of the
/// container's outcomes. Each origin has at most one transition.
fn validate_transition(
    container: &State,
    transition: &Transition,
    ignore: Option<TransitionId>,
) -> ModelResult<()> {
    let from_container = transition.from_state == container.id;
    if from_container {
        if transition.from_outcome.is_some() {
            return Err(ModelError::invalid_connection(
                "a start transition cannot leave through an outcome",
            ));
        }
    } else {
        let child = container.child(&transition.from_state).ok_or_else(|| {
            ModelError::invalid_connection(format!("unknown origin state {}", transition.from_state))
        })?;
        match transition.from_outcome {
            Some(outcome) if child.outcomes.contains_key(&outcome) => {}
            _ => {
                return Err(ModelError::invalid_connection(format!(
                    "state {} has no outcome {:?}",
                    child.id, transition.from_outcome
                )))
            }
        }
    }

    if transition.to_state == container.id {
        match transition.to_outcome {
            Some(outcome) if container.outcomes.contains_key(&outcome) => {}
            _ => {
                return Err(ModelError::invalid_connection(format!(
                    "container {} has no outcome {:?}",
                    container.id, transition.to_outcome
                )))
            }
        }
    } else if container.child(&transition.to_state).is_none() || transition.to_outcome.is_some() {
        return Err(ModelError::invalid_connection(format!(
            "invalid target {} / {:?}",
            transition.to_state, transition.to_outcome
        )));
    }

    let taken = container.transitions.values().any(|existing| {
        Some(existing.id) != ignore
            && existing.from_state == transition.from_state
            && existing.from_outcome == transition.from_outcome
    });
    if taken {
        return Err(ModelError::invalid_connection(format!(
            "origin {} / {:?} is already connected",
            transition.from_state, transition.from_outcome
        )));
    }
    Ok(())
}

fn validate_data_flow(container: &State, flow: &DataFlow) -> ModelResult<()> {
    let endpoint = |state: &StateId, key: PortId| {
        let owner = if state == &container.id {
            Some(container)
        } else {
            container.child(state)
        };
        owner.map_or(false, |owner| owner.has_key(key))
    };

    if !endpoint(&flow.from_state, flow.from_key) {
        return Err(ModelError::invalid_connection(format!(
            "unknown data flow source {} / {}",
            flow.from_state, flow.from_key
        )));
    }
    if !endpoint(&flow.to_state, flow.to_key) {
        return Err(ModelError::invalid_connection(format!(
            "unknown data flow target {} / {}",
            flow.to_state, flow.to_key
        )));
    }
    Ok(())
}
