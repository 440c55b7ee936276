#![no_main]

use board_layout::{Forest, LayoutEditor, LayoutPolicy, RepairFailure, WorkspaceSnapshot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Cap length to keep fuzzing fast.
    if text.len() > 8192 {
        return;
    }
    let Ok(snapshot) = WorkspaceSnapshot::from_json(text) else {
        return;
    };

    // Repair either refuses unrepairable input or yields a strictly valid forest.
    match Forest::from_snapshot_lenient(snapshot.forest_snapshot()) {
        Ok(outcome) => {
            outcome.forest.validate().expect("repaired forest is valid");
            assert!(!outcome.report_after.has_errors());
        }
        Err(err) => assert!(
            matches!(err.reason, RepairFailure::UnsafeIssuesPresent { .. }),
            "repair produced an invalid forest: {err}"
        ),
    }

    if let Ok(mut editor) = LayoutEditor::load(snapshot, LayoutPolicy::default()) {
        let saved = editor.save();
        assert!(!saved.forest_snapshot().invariant_report().has_errors());
    }
});
