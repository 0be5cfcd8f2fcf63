use std::sync::Arc;

use provenance_common::types::{Note, NoteKind};
use provenance_server::registration::CollectorRegistry;
use provenance_server::store::MemoryEvidenceStore;

const PROJECT: &str = "projects/provenance";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_converge_on_one_note_per_kind() {
    let store = Arc::new(MemoryEvidenceStore::new());
    let notes = vec![
        Note { kind: NoteKind::Build, ..Note::default() },
        Note { kind: NoteKind::Intoto, ..Note::default() },
    ];

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = CollectorRegistry::new(store.clone(), PROJECT);
        let notes = notes.clone();
        tasks.push(tokio::spawn(async move { registry.register("tekton", notes).await }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.expect("task").expect("registration"));
    }

    let first = &results[0];
    assert!(results.iter().all(|result| result == first));
    assert_eq!(
        first.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["tekton-build", "tekton-intoto"]
    );
    assert_eq!(first["tekton-build"].name, format!("{PROJECT}/notes/tekton-build"));

    let stored = store.notes().await;
    assert_eq!(stored.len(), 2);
    assert_eq!(store.notes_created(), 2);
}
