//! Tests for edit/undo/redo/recover sequences
//!
//! This tests:
//! - N edits then N undos restore the original document
//! - k undos then k redos round trip
//! - Branching keeps abandoned versions in the tree
//! - Recovering a version equals replaying the edits leading to it

use std::collections::HashMap;

use anyhow::Result;
use trellis_history::{EditSession, HistoryConfig, HistoryError, Step, VersionId};
use trellis_model::{
    ChangeObserver, DataFlow, Document, ModelResult, NullObserver, PortDirection, ScopedVariable,
    State, StateId, StateKind, StatePath, Transition,
};

const EDIT_COUNT: usize = 11;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn new_document() -> Document {
    Document::new(
        "turnstile",
        State::new(StateId::new("ROOT"), "root", StateKind::Hierarchy),
    )
}

fn new_session() -> EditSession {
    EditSession::new("test", new_document(), HistoryConfig::default())
}

fn path(p: &str) -> StatePath {
    StatePath::parse(p).unwrap()
}

/// Distinct edits, each valid on the result of the ones before it
fn scripted_edit(step: usize, doc: &mut Document, obs: &mut dyn ChangeObserver) -> ModelResult<()> {
    let root = path("ROOT");
    match step {
        0 => {
            doc.add_state(obs, &root, State::new(StateId::new("A"), "locked", StateKind::Execution))?;
        }
        1 => {
            doc.add_state(obs, &root, State::new(StateId::new("B"), "unlocked", StateKind::Execution))?;
        }
        2 => doc.set_start_state(obs, &root, Some(StateId::new("A")))?,
        3 => {
            doc.add_outcome(obs, &path("ROOT/A"), "coin")?;
        }
        4 => {
            doc.add_transition(
                obs,
                &root,
                Transition::new(StateId::new("A"), Some(1), StateId::new("B"), None),
            )?;
        }
        5 => {
            doc.add_output_port(obs, &path("ROOT/A"), "coins", "int")?;
        }
        6 => {
            doc.add_scoped_variable(obs, &root, ScopedVariable::new("total", "int"))?;
        }
        7 => {
            // output port 1 of A into the scoped variable of the root
            let variable = *doc.root().scoped_variables.keys().next().unwrap_or(&0);
            doc.add_data_flow(
                obs,
                &root,
                DataFlow::new(StateId::new("A"), 1, StateId::new("ROOT"), variable),
            )?;
        }
        8 => doc.set_state_name(obs, &path("ROOT/B"), "open")?,
        9 => doc.set_port_data_type(obs, &path("ROOT/A"), PortDirection::Output, 1, "float")?,
        10 => {
            doc.remove_state(obs, &path("ROOT/B"))?;
        }
        _ => unreachable!("no scripted edit {}", step),
    }
    Ok(())
}

fn run(session: &mut EditSession, step: usize) -> Result<VersionId> {
    session.edit(|doc, obs| scripted_edit(step, doc, obs))?;
    Ok(session.history().engine().current_version())
}

#[test]
fn test_n_edits_then_n_undos_restore_original() -> Result<()> {
    init_tracing();
    let mut session = new_session();
    let original = session.document().root().clone();

    for step in 0..EDIT_COUNT {
        run(&mut session, step)?;
    }
    assert_eq!(session.trail().len(), EDIT_COUNT + 1);

    for _ in 0..EDIT_COUNT {
        assert!(session.undo()?);
    }
    assert!(!session.undo()?);
    assert_eq!(session.document().root(), &original);
    Ok(())
}

#[test]
fn test_k_undos_then_k_redos_round_trip() -> Result<()> {
    for k in 1..=EDIT_COUNT {
        let mut session = new_session();
        // states[i] is the document after the first i edits
        let mut states = vec![session.document().root().clone()];
        for step in 0..EDIT_COUNT {
            run(&mut session, step)?;
            states.push(session.document().root().clone());
        }

        for _ in 0..k {
            session.undo()?;
        }
        assert_eq!(session.document().root(), &states[EDIT_COUNT - k], "after {} undos", k);

        for _ in 0..k {
            session.redo()?;
        }
        assert_eq!(session.document().root(), &states[EDIT_COUNT], "after {} redos", k);
        assert!(!session.redo()?);
    }
    Ok(())
}

#[test]
fn test_new_edit_after_undos_branches() -> Result<()> {
    let n = 6;
    let m = 2;
    let mut session = new_session();
    for step in 0..n {
        run(&mut session, step)?;
    }
    for _ in 0..m {
        session.undo()?;
    }

    run(&mut session, 8)?;

    // every edit plus the sentinel and the new edit stays in the tree
    assert_eq!(session.all_versions().len(), n + 2);
    // the trail lost the m undone edits
    assert_eq!(session.trail().len(), n - m + 2);
    assert!(!session.history().can_redo());
    session.history().check_consistency()?;
    Ok(())
}

#[test]
fn test_concrete_branch_scenario() -> Result<()> {
    init_tracing();
    let mut session = new_session();
    let branches = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let seen = branches.clone();
    session
        .history_mut()
        .on_branch(move |branch| seen.borrow_mut().push(*branch));

    let e1 = run(&mut session, 0)?;
    let e2 = run(&mut session, 1)?;
    let e3 = run(&mut session, 2)?;
    let ids: Vec<VersionId> = session.trail().iter().map(|a| a.version_id).collect();
    assert_eq!(ids, vec![0, e1, e2, e3]);

    session.undo()?;
    session.undo()?;
    assert_eq!(session.history().engine().trail().pointer(), 1);
    assert_eq!(session.document().root().states.len(), 1);

    // a different edit than the undone ones
    let e4 = run(&mut session, 6)?;
    let ids: Vec<VersionId> = session.trail().iter().map(|a| a.version_id).collect();
    assert_eq!(ids, vec![0, e1, e4]);
    assert_eq!(session.all_versions().len(), 5);

    let tree = session.history().engine().tree();
    assert_eq!(tree.node(e1)?.old_next_ids(), &[e2]);
    assert_eq!(tree.node(e1)?.next_id(), Some(e4));
    assert_eq!(branches.borrow().len(), 1);
    assert_eq!(branches.borrow()[0].at, e1);

    assert_eq!(
        session.history().undo_redo_path(e3)?,
        vec![(e4, Step::Undo), (e2, Step::Redo), (e3, Step::Redo)]
    );
    session.recover_version(e3)?;

    let ids: Vec<VersionId> = session.trail().iter().map(|a| a.version_id).collect();
    assert_eq!(ids, vec![0, e1, e2, e3]);
    let tree = session.history().engine().tree();
    assert_eq!(tree.node(e1)?.next_id(), Some(e2));
    assert_eq!(tree.node(e1)?.old_next_ids(), &[e4]);
    assert_eq!(session.document().root().start_state, Some(StateId::new("A")));
    assert!(session.document().root().scoped_variables.is_empty());
    session.history().check_consistency()?;
    Ok(())
}

#[test]
fn test_recover_equals_replay() -> Result<()> {
    init_tracing();
    let mut session = new_session();
    // scripted steps leading to each version
    let mut steps_to: HashMap<VersionId, Vec<usize>> = HashMap::new();
    steps_to.insert(0, Vec::new());
    let mut record = |session: &mut EditSession, step: usize| -> Result<()> {
        let prev = session.history().engine().current_version();
        let id = run(session, step)?;
        let mut steps = steps_to[&prev].clone();
        steps.push(step);
        steps_to.insert(id, steps);
        Ok(())
    };

    for step in 0..6 {
        record(&mut session, step)?;
    }
    session.undo()?;
    session.undo()?;
    record(&mut session, 6)?;
    record(&mut session, 8)?;
    session.undo()?;
    session.undo()?;
    session.undo()?;
    record(&mut session, 8)?;
    drop(record);

    let versions: Vec<VersionId> = session
        .all_versions()
        .iter()
        .map(|v| v.summary.version_id)
        .collect();
    assert_eq!(versions.len(), 10);

    for target in versions.iter().rev().chain(versions.iter()) {
        session.recover_version(*target)?;
        session.history().check_consistency()?;

        let mut replayed = new_document();
        for step in &steps_to[target] {
            scripted_edit(*step, &mut replayed, &mut NullObserver)?;
        }
        assert_eq!(session.document().root(), replayed.root(), "version {}", target);
        assert_eq!(session.history().engine().current_version(), *target);
    }
    Ok(())
}

#[test]
fn test_recover_current_version_is_noop() -> Result<()> {
    let mut session = new_session();
    let e1 = run(&mut session, 0)?;
    let count = session.history().change_count();

    session.recover_version(e1)?;

    assert_eq!(session.history().change_count(), count);
    Ok(())
}

#[test]
fn test_recover_unknown_version() {
    let mut session = new_session();
    let err = session.recover_version(42).unwrap_err();
    assert!(matches!(err, HistoryError::UnknownVersion(42)));
}

#[test]
fn test_disabled_history_records_nothing() -> Result<()> {
    let config = HistoryConfig {
        enabled: false,
        ..HistoryConfig::default()
    };
    let mut session = EditSession::new("test", new_document(), config);

    run(&mut session, 0)?;

    assert_eq!(session.trail().len(), 1);
    assert!(!session.undo()?);
    // not even an unknown version is looked up
    session.recover_version(42)?;
    assert_eq!(session.document().root().states.len(), 1);
    assert_eq!(session.history().change_count(), 0);
    Ok(())
}
