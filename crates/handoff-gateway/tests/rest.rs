use handoff_core::domain::{AgentId, DeliveryOutcome, SessionId, SessionStatus, StatusLookup};
use handoff_gateway::{
    AuthClient, DenylistInsert, Gateway, GatewayError, RestClient, SessionStateUpdate,
    SupabaseGateway,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rest_for(server: &MockServer) -> RestClient {
    RestClient::new(Url::parse(&server.uri()).unwrap(), "anon-key").unwrap()
}

fn gateway_for(server: &MockServer, webhook: bool) -> SupabaseGateway {
    let rest = rest_for(server).with_access_token("agent-jwt");
    let webhook_url = webhook.then(|| Url::parse(&format!("{}/webhook/send", server.uri())).unwrap());
    SupabaseGateway::new(rest, webhook_url)
}

fn session() -> SessionId {
    SessionId::new("5551234567").unwrap()
}

fn agent() -> AgentId {
    AgentId::new("agent-42").unwrap()
}

#[tokio::test]
async fn history_is_requested_newest_first_and_returned_oldest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/n8n_chat_histories"))
        .and(query_param("order", "time.desc"))
        .and(query_param("limit", "2"))
        .and(header("apikey", "anon-key"))
        .and(header("Authorization", "Bearer agent-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 2, "session_id": "5551234567", "message": { "type": "ai", "content": "hola" }, "time": "2024-05-01T10:01:00+00:00" },
            { "id": 1, "session_id": "5551234567", "message": { "type": "human", "content": "hi" }, "time": "2024-05-01T10:00:00+00:00" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = gateway_for(&server, false)
        .fetch_history(None, 2)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id.0, 1);
    assert_eq!(rows[1].id.0, 2);
}

#[tokio::test]
async fn missing_state_row_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/chat_sessions_state"))
        .and(query_param("session_id", "eq.5551234567"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let lookup = gateway_for(&server, false)
        .fetch_session_status(&session())
        .await
        .unwrap();
    assert_eq!(lookup, StatusLookup::NotFound);
}

#[tokio::test]
async fn status_upsert_merges_on_session_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/chat_sessions_state"))
        .and(query_param("on_conflict", "session_id"))
        .and(header("Prefer", "resolution=merge-duplicates,return=minimal"))
        .and(body_partial_json(json!({
            "session_id": "5551234567",
            "status": "agent_active",
            "agent_id": "agent-42"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    gateway_for(&server, false)
        .upsert_session_state(
            &session(),
            &SessionStateUpdate::status(SessionStatus::AgentActive, Some(agent())),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_denylist_insert_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/blocked_users"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint",
            "details": null
        })))
        .mount(&server)
        .await;

    let outcome = gateway_for(&server, false)
        .insert_denylist(&session(), &agent())
        .await
        .unwrap();
    assert_eq!(outcome, DenylistInsert::AlreadyPresent);
}

#[tokio::test]
async fn backend_errors_carry_status_and_code() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/blocked_users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "PGRST301",
            "message": "JWT expired"
        })))
        .mount(&server)
        .await;

    let err = gateway_for(&server, false)
        .delete_denylist(&session())
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    match err {
        GatewayError::Backend { code, message, .. } => {
            assert_eq!(code.as_deref(), Some("PGRST301"));
            assert_eq!(message, "JWT expired");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn send_stores_then_posts_to_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/n8n_chat_histories"))
        .and(body_partial_json(json!({
            "session_id": "5551234567",
            "message": { "type": "ai", "content": "Hola, soy Ana" },
            "sent_by_agent": true,
            "agent_id": "agent-42"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 77,
            "session_id": "5551234567",
            "message": { "type": "ai", "content": "Hola, soy Ana" },
            "time": "2024-05-01T10:05:00+00:00",
            "sent_by_agent": true,
            "agent_id": "agent-42"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook/send"))
        .and(body_json(json!({
            "sessionId": "5551234567",
            "message": "Hola, soy Ana",
            "agentId": "agent-42"
        })))
        .respond_with(ResponseTemplate::new(500).set_body_string("workflow failed"))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = gateway_for(&server, true)
        .send_agent_message(&session(), "Hola, soy Ana", &agent())
        .await
        .unwrap();
    assert_eq!(receipt.message.id.0, 77);
    assert!(receipt.message.is_agent_message);
    match receipt.delivery {
        DeliveryOutcome::Failed(reason) => assert!(reason.contains("500")),
        DeliveryOutcome::Delivered => panic!("delivery should have failed"),
    }
}

#[tokio::test]
async fn pin_falls_back_to_upsert_when_no_row_matches() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/chat_sessions_state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/chat_sessions_state"))
        .and(body_partial_json(json!({ "status": "bot_active", "is_pinned": true })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    gateway_for(&server, false)
        .set_pinned(&session(), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn password_sign_in_returns_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", "anon-key"))
        .and(body_json(json!({ "email": "ana@example.com", "password": "hunter22" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jwt",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "user": { "id": "agent-42", "email": "ana@example.com" }
        })))
        .mount(&server)
        .await;

    let session = AuthClient::new(rest_for(&server))
        .sign_in_password("ana@example.com", "hunter22")
        .await
        .unwrap();
    assert_eq!(session.agent_id().as_str(), "agent-42");
    assert_eq!(session.access_token, "jwt");
}

#[tokio::test]
async fn rejected_sign_in_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let err = AuthClient::new(rest_for(&server))
        .sign_in_password("ana@example.com", "wrong")
        .await
        .unwrap_err();
    match err {
        GatewayError::Auth(message) => assert!(message.contains("Invalid login credentials")),
        other => panic!("unexpected error: {other:?}"),
    }
}
