//! Two HTTP clients against a live server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use roster_api::{Router, Server};
use roster_client::{
    ClientConfig, ClientError, EditableGrid, FieldValue, HttpTransport, PersonApi, PersonDraft,
    PersonField, Session,
};
use roster_core::config::RosterConfig;
use roster_core::{ChangeFeed, PersonTable};
use roster_runtime::{Runtime, RuntimeHandle};

async fn start_server() -> (String, watch::Sender<bool>, RuntimeHandle) {
    let config = RosterConfig {
        data_dir: None,
        ..Default::default()
    };
    let table = Arc::new(PersonTable::new(Arc::new(ChangeFeed::new(config.feed_capacity))));
    let (api_tx, api_rx) = mpsc::channel(config.queue_capacity());
    let runtime = Runtime::new(table.clone(), config.clone(), api_rx)
        .spawn()
        .unwrap();
    let router = Router::new(table, Arc::new(config), api_tx);
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = Server::bind(addr, router).await.unwrap();
    let base_url = format!("http://{}", server.local_addr().unwrap());
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.serve(shutdown_rx));
    (base_url, shutdown, runtime)
}

fn client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        feed_wait_ms: 500,
        retry_delay_ms: 50,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_and_edit_over_http() {
    let (base_url, shutdown, _runtime) = start_server().await;
    let config = client_config(&base_url);
    let transport = Arc::new(HttpTransport::new(&config).unwrap());
    let session = Session::new(transport.clone(), &config);
    assert!(session.refresh().await.is_empty());

    let handle = session.submit_create(PersonDraft::new("Ada", "Lovelace", 36));
    assert!(session.snapshot().has_placeholders());
    let created = handle.outcome().await.unwrap();
    session.wait_idle().await;

    let all = transport.get_all().await.unwrap();
    assert_eq!(all, vec![created.clone()]);
    assert_eq!(session.snapshot().records(), &[created.clone()]);

    let updated = session
        .submit_field_update(&created.id, PersonField::Age, FieldValue::Integer(41))
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert_eq!(updated.age, 41);
    session.wait_idle().await;
    assert_eq!(session.snapshot().records()[0].age, 41);

    let err = transport
        .update(
            &roster_client::PersonId::generate(),
            roster_core::FieldPatch::parse_input(PersonField::Age, "1").unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));

    let _ = shutdown.send(true);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_client_sees_changes_through_feed() {
    let (base_url, shutdown, _runtime) = start_server().await;
    let config = client_config(&base_url);

    let watcher_transport = Arc::new(HttpTransport::new(&config).unwrap());
    let watcher = Session::new(watcher_transport.clone(), &config);
    watcher.refresh().await;
    let _subscription = watcher.subscribe(watcher_transport, &config);
    let mut changes = watcher.changes();

    let editor = Session::new(Arc::new(HttpTransport::new(&config).unwrap()), &config);
    editor.refresh().await;
    editor
        .submit_create(PersonDraft::new("Grace", "Hopper", 85))
        .outcome()
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while watcher.snapshot().is_empty() {
            changes.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let mut grid = EditableGrid::new(config.page_size);
    let view = grid.view(&watcher);
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.rows[0].first_name, "Grace");
    assert!(!view.rows[0].id.is_placeholder());

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let config = ClientConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        request_timeout_ms: 500,
        ..Default::default()
    };
    let transport = HttpTransport::new(&config).unwrap();
    let err = transport.get_all().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
