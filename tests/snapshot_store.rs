use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use mail_threader::store::groups_from_overrides;
use mail_threader::{
    ManualThreadGroup, MessageRecord, Snapshot, SnapshotStore, apply_groups, apply_overrides,
    build_threads,
};

fn messages() -> Vec<MessageRecord> {
    let start = Utc.with_ymd_and_hms(2025, 2, 10, 8, 0, 0).unwrap();
    vec![
        MessageRecord::new("1", "<kickoff@team>", start).with_subject("Kickoff"),
        MessageRecord::new("2", "<notes@team>", start + Duration::hours(1))
            .with_subject("Re: Kickoff")
            .with_in_reply_to("<kickoff@team>")
            .unread(),
        MessageRecord::new("3", "<budget@team>", start + Duration::hours(2)).with_subject("Budget"),
        MessageRecord::new("4", "<hiring@team>", start + Duration::hours(3)).with_subject("Hiring"),
    ]
}

#[test]
fn conflicting_groups_are_persisted_corrected() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("threads.json"));

    let mut snapshot = Snapshot::default();
    snapshot.merge_messages(messages());
    let base = build_threads(&snapshot.messages);
    let kickoff = base.algorithmic_thread_ids["kickoff@team"].clone();
    let budget = base.algorithmic_thread_ids["budget@team"].clone();

    let mut planning = ManualThreadGroup::with_id("planning", Some("Planning".into()));
    planning.jwz_thread_ids.extend([kickoff.clone(), budget.clone()]);
    let mut money = ManualThreadGroup::with_id("money", None);
    money.jwz_thread_ids.insert(budget.clone());
    snapshot.groups = vec![planning.clone(), money];
    store.save(&snapshot).unwrap();

    let mut loaded = store.load().unwrap();
    let (_, updated) = apply_groups(&loaded.groups, &base);
    assert_eq!(loaded.apply_group_corrections(&updated), 1);
    store.save(&loaded).unwrap();

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded.groups[0], planning);
    assert!(reloaded.groups[1].jwz_thread_ids.is_empty());

    let (result, updated) = apply_groups(&reloaded.groups, &base);
    assert!(updated.is_empty());
    assert!(result.contains_thread("planning"));
    assert!(!result.contains_thread("money"));
}

#[test]
fn invalid_overrides_are_pruned() {
    let mut snapshot = Snapshot::default();
    snapshot.merge_messages(messages());
    let base = build_threads(&snapshot.messages);
    let kickoff = base.algorithmic_thread_ids["kickoff@team"].clone();

    snapshot.overrides.insert("hiring@team".into(), kickoff);
    snapshot.overrides.insert("hiring@team-typo".into(), "thr-ffffffffffffffff".into());

    let (result, invalid) = apply_overrides(&snapshot.overrides, &base);
    assert_eq!(result.threads.len(), 2);
    assert_eq!(snapshot.prune_overrides(&invalid), 1);
    assert_eq!(snapshot.overrides.len(), 1);
}

#[test]
fn migrated_overrides_produce_same_membership() {
    let mut snapshot = Snapshot::default();
    snapshot.merge_messages(messages());
    let base = build_threads(&snapshot.messages);
    let kickoff = base.algorithmic_thread_ids["kickoff@team"].clone();

    snapshot.overrides = BTreeMap::from([
        ("budget@team".to_string(), kickoff.clone()),
        ("hiring@team".to_string(), kickoff.clone()),
    ]);
    let (overridden, _) = apply_overrides(&snapshot.overrides, &base);

    assert_eq!(snapshot.migrate_overrides(), 2);
    assert!(snapshot.overrides.is_empty());
    assert_eq!(snapshot.groups.len(), 1);

    let (grouped, _) = apply_groups(&snapshot.groups, &base);
    assert_eq!(grouped.thread_count(), overridden.thread_count());
    assert_eq!(grouped.threads[0].message_count, 4);
    assert_eq!(
        grouped.effective_thread_ids["budget@team"],
        grouped.effective_thread_ids["notes@team"]
    );

    // replaying the migration adds nothing
    let again = groups_from_overrides(
        &BTreeMap::from([("budget@team".to_string(), kickoff)]),
        &snapshot.groups,
    );
    assert_eq!(again, snapshot.groups);
}

#[test]
fn snapshot_json_tolerates_missing_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("threads.json");
    std::fs::write(
        &path,
        r#"{"messages":[{"id":"1","message_id":"<a@b>","date":"2025-01-01T00:00:00Z"}]}"#,
    )
    .unwrap();

    let snapshot = SnapshotStore::new(&path).load().unwrap();

    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.overrides.is_empty());
    assert!(snapshot.groups.is_empty());
    assert_eq!(build_threads(&snapshot.messages).thread_count(), 1);
}
