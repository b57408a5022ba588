use handoff_core::domain::{AgentId, SessionId};
use handoff_core::rules::UnreadCounter;
use handoff_store::Store;

fn store() -> Store {
    let store = Store::open_in_memory().expect("open in memory");
    store.migrate().expect("migrate");
    store
}

fn id(raw: &str) -> SessionId {
    SessionId::new(raw).expect("session id")
}

#[test]
fn save_replaces_counts_for_agent() {
    let store = store();
    let agent = AgentId::new("agent-42").expect("agent");
    let repo = store.unread();

    let counter = UnreadCounter::from_counts(vec![(id("5551234567"), 3), (id("5550000000"), 1)]);
    repo.save(1_700_000_000, &agent, &counter).expect("save");
    assert_eq!(repo.load(&agent).expect("load"), counter);

    let smaller = UnreadCounter::from_counts(vec![(id("5550000000"), 2)]);
    repo.save(1_700_000_100, &agent, &smaller).expect("save again");
    let loaded = repo.load(&agent).expect("load again");
    assert_eq!(loaded.count(&id("5551234567")), 0);
    assert_eq!(loaded.count(&id("5550000000")), 2);
}

#[test]
fn counts_are_scoped_per_agent() {
    let store = store();
    let first = AgentId::new("agent-1").expect("agent");
    let second = AgentId::new("agent-2").expect("agent");
    let repo = store.unread();

    repo.set(1, &first, &id("a"), 4).expect("set");
    repo.set(1, &second, &id("a"), 1).expect("set other");
    repo.set(2, &first, &id("a"), 5).expect("overwrite");

    assert_eq!(repo.load(&first).expect("load").count(&id("a")), 5);
    assert_eq!(repo.load(&second).expect("load").count(&id("a")), 1);

    repo.set(3, &first, &id("a"), 0).expect("zero clears");
    assert!(repo.load(&first).expect("load").total() == 0);
    repo.clear(&second, &id("a")).expect("clear");
    assert_eq!(repo.load(&second).expect("load").total(), 0);
}
