use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::time::timeout;

use formpilot_lib::config::{AppConfig, FillConfig};
use formpilot_lib::dom::Document;
use formpilot_lib::host::serve;
use formpilot_lib::profile::{MemoryStore, UserProfile};
use formpilot_lib::session::{Collaborators, PageSession};

struct Client {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
}

impl Client {
    async fn send_line(&mut self, line: &str) {
        self.input.write_all(line.as_bytes()).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
    }

    /// Next non-notification line.
    async fn next_response(&mut self) -> Value {
        loop {
            let line = timeout(Duration::from_secs(5), self.output.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let value: Value = serde_json::from_str(&line).unwrap();
            if value.get("notification").is_none() {
                return value;
            }
        }
    }

    async fn request(&mut self, request: Value) -> Value {
        self.send_line(&request.to_string()).await;
        let response = self.next_response().await;
        assert_eq!(response["id"], request["id"], "{response}");
        response
    }
}

fn start() -> (Client, tokio::task::JoinHandle<()>) {
    let mut profile = UserProfile::default();
    profile.personal_info.first_name = "Ada".into();
    let config = AppConfig {
        fill: FillConfig::immediate(),
        ..AppConfig::default()
    };
    let session = Arc::new(PageSession::new(
        Document::new("about:blank"),
        &config,
        Arc::new(MemoryStore::with_profile(profile)),
        Collaborators::default(),
    ));

    let (client_in, host_in) = tokio::io::duplex(64 * 1024);
    let (host_out, client_out) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(async move {
        serve(session, BufReader::new(host_in), host_out).await.unwrap();
    });
    (
        Client {
            input: client_in,
            output: BufReader::new(client_out).lines(),
        },
        task,
    )
}

#[tokio::test]
async fn load_detect_fill_over_json_lines() {
    let (mut client, task) = start();

    let loaded = client
        .request(json!({
            "id": 1,
            "action": "loadPage",
            "html": "<html><head><title>Apply</title></head><body><form><input name=\"firstName\"></form></body></html>",
            "url": "https://careers.example.com/apply"
        }))
        .await;
    assert_eq!(loaded["success"], true);
    assert_eq!(loaded["detection"]["success"], true);
    assert_eq!(loaded["detection"]["fieldCount"], 1);

    let filled = client.request(json!({"id": 2, "action": "fillForm"})).await;
    assert_eq!(filled["success"], true);
    assert_eq!(filled["outcome"]["status"], "completed");
    assert_eq!(filled["outcome"]["filled"], 1);

    let context = client.request(json!({"id": 3, "action": "getPageContext"})).await;
    assert_eq!(context["title"], "Apply");
    assert_eq!(context["hasForm"], true);
    assert_eq!(context["inputCount"], 1);
    assert_eq!(context["currentAnalysis"]["fieldCount"], 1);

    let fields = client.request(json!({"id": 4, "action": "getFormFields"})).await;
    assert_eq!(fields["fields"][0]["fieldName"], "firstName");
    assert_eq!(fields["fields"][0]["type"], "text");

    let user = client.request(json!({"id": 5, "action": "getUserData"})).await;
    assert_eq!(user["data"]["personalInfo"]["firstName"], "Ada");

    drop(client);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn bad_requests_get_structured_errors() {
    let (mut client, task) = start();

    let unknown = client.request(json!({"id": "a", "action": "teleport"})).await;
    assert_eq!(unknown, json!({"id": "a", "success": false, "error": "Unknown action"}));

    let malformed = client.request(json!({"id": "b", "action": "updateUserData"})).await;
    assert_eq!(malformed["success"], false);
    assert!(malformed["error"].as_str().unwrap().starts_with("Invalid request"));

    let premature = client.request(json!({"id": "c", "action": "fillForm"})).await;
    assert_eq!(premature["error"], "Please detect form first");

    client.send_line("this is not json").await;
    let garbage = client.next_response().await;
    assert_eq!(garbage["success"], false);
    assert!(garbage["error"].as_str().unwrap().starts_with("Invalid JSON"));

    let nothing = client.request(json!({"id": "d", "action": "detectForm"})).await;
    assert_eq!(nothing["success"], false);
    assert_eq!(nothing["message"], "No form detected on this page");

    drop(client);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn appended_form_is_detected_and_fillable() {
    let (mut client, task) = start();

    let loaded = client
        .request(json!({
            "id": 1,
            "action": "loadPage",
            "html": "<html><body><div id=\"app\"><p>Loading...</p></div></body></html>",
            "url": "https://careers.example.com/apply"
        }))
        .await;
    assert_eq!(loaded["detection"]["success"], false);

    let noise = client
        .request(json!({"id": 2, "action": "appendHtml", "selector": "#app", "html": "<p>Still loading</p>"}))
        .await;
    assert_eq!(noise["success"], true);
    assert!(noise.get("detection").is_none());

    let rendered = client
        .request(json!({
            "id": 3,
            "action": "appendHtml",
            "selector": "#app",
            "html": "<form><input name=\"firstName\"></form>"
        }))
        .await;
    assert_eq!(rendered["added"], 1);
    assert_eq!(rendered["detection"]["success"], true);
    assert_eq!(rendered["detection"]["fieldCount"], 1);

    let filled = client.request(json!({"id": 4, "action": "fillForm"})).await;
    assert_eq!(filled["outcome"]["filled"], 1);

    let missing = client
        .request(json!({"id": 5, "action": "appendHtml", "selector": "#nowhere", "html": "<input>"}))
        .await;
    assert_eq!(missing["success"], false);

    drop(client);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn settings_round_trip_with_timestamp() {
    let (mut client, task) = start();

    let initial = client.request(json!({"id": 1, "action": "getSettings"})).await;
    assert_eq!(initial["settings"]["mode"], "basic");
    assert!(initial["settings"]["lastUpdated"].is_null());

    let mut settings = initial["settings"].clone();
    settings["mode"] = json!("advanced");
    settings["customKeywords"] = json!("robotics, LLM");
    let saved = client
        .request(json!({"id": 2, "action": "saveSettings", "settings": settings}))
        .await;
    assert_eq!(saved["success"], true);
    assert!(saved["settings"]["lastUpdated"].is_string());

    let reread = client.request(json!({"id": 3, "action": "getSettings"})).await;
    assert_eq!(reread["settings"]["mode"], "advanced");
    assert_eq!(reread["settings"]["customKeywords"], "robotics, LLM");
    assert_eq!(reread["settings"]["lastUpdated"], saved["settings"]["lastUpdated"]);

    drop(client);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn assistant_actions_need_a_backend() {
    let (mut client, task) = start();

    let chat = client.request(json!({"id": 1, "action": "chat", "message": "What is this page?"})).await;
    assert_eq!(chat["success"], false);
    assert!(chat["error"].as_str().unwrap().contains("not configured"));

    let translated = client
        .request(json!({"id": 2, "action": "translate", "text": "Hallo", "sourceLang": "DE"}))
        .await;
    assert_eq!(translated["success"], false);

    drop(client);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}
