use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;
use wiremock::MockServer;

use kbchat::api::HttpBackend;
use kbchat::auth::{AuthGateway, Credential};
use kbchat::config::ChatConfig;
use kbchat::ChatClient;

pub const TOKEN: &str = "test-token";

#[allow(dead_code)]
pub fn backend_for(server: &MockServer) -> HttpBackend {
    HttpBackend::new(
        Url::parse(&server.uri()).expect("mock server uri"),
        Url::parse(&format!("{}/api/chat", server.uri())).expect("proxy uri"),
        Duration::from_secs(5),
    )
    .expect("failed to build backend")
}

#[allow(dead_code)]
pub fn client_for(server: &MockServer, config: ChatConfig) -> (ChatClient, AuthGateway) {
    let auth = AuthGateway::with_credential(Credential::bearer(TOKEN));
    let client = ChatClient::new(Arc::new(backend_for(server)), auth.clone(), config);
    (client, auth)
}

#[allow(dead_code)]
pub fn session_json(id: i64, title: &str, message_count: usize) -> Value {
    json!({
        "id": id,
        "title": title,
        "created_at": "2024-05-01T10:00:00.000000",
        "updated_at": "2024-05-01T10:05:00.000000",
        "message_count": message_count,
        "last_message_preview": null
    })
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
