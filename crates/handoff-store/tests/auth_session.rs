use chrono::{TimeZone, Utc};
use handoff_core::domain::{AgentId, AuthSession, AuthUser};
use handoff_store::Store;

fn session(token: &str) -> AuthSession {
    AuthSession {
        access_token: format!("access-{token}"),
        refresh_token: format!("refresh-{token}"),
        expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        user: AuthUser {
            id: AgentId::new("agent-42").expect("agent"),
            email: Some("agent@example.com".to_string()),
        },
    }
}

#[test]
fn save_load_and_clear_session() {
    let store = Store::open_in_memory().expect("open in memory");
    store.migrate().expect("migrate");
    let repo = store.auth_session();

    assert!(repo.load().expect("load empty").is_none());
    repo.save(1_700_000_000, &session("one")).expect("save");
    repo.save(1_700_000_050, &session("two")).expect("overwrite");

    let loaded = repo.load().expect("load").expect("session");
    assert_eq!(loaded, session("two"));

    assert!(repo.clear().expect("clear"));
    assert!(!repo.clear().expect("clear again"));
    assert!(repo.load().expect("load cleared").is_none());
}
