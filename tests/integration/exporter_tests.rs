//! Scrape endpoint integration tests

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_test::assert_ok;

use treewatch::config::MetricsConfig;
use treewatch::metrics::{MetricsServer, Registry};
use treewatch::{Dispatcher, InstrumentedTree, MetricsError};

fn local_config() -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..MetricsConfig::default()
    }
}

async fn get(addr: SocketAddr, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nAccept: */*\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let status = head.lines().next().unwrap().to_string();
    (status, body.to_string())
}

#[tokio::test]
async fn test_scrape_reports_tree_state() {
    let dispatcher = Dispatcher::new(local_config()).unwrap();
    let addr = dispatcher.before_start_thread().expect("endpoint should start");
    let tree = InstrumentedTree::new(dispatcher.clone());

    dispatcher.after_server_operation(|| tree.add(5u32));
    dispatcher.after_server_operation(|| tree.add(5));
    dispatcher.after_server_operation(|| tree.remove(&5));
    dispatcher.after_server_operation(|| tree.remove(&5));

    let (status, body) = get(addr, "/metrics").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(body.contains("# TYPE java_number_of_iterations counter\n"));
    assert!(body.contains("java_number_of_iterations{} 4\n"));
    assert!(body.contains("java_number_of_failed_adds{} 1\n"));
    assert!(body.contains("java_number_of_failed_removes{} 1\n"));
    assert!(body.contains("# TYPE java_number_of_nodes gauge\n"));
    assert!(body.contains("java_number_of_nodes{} 0\n"));
    assert!(body.contains("# TYPE java_time_to_add summary\n"));
    assert!(body.contains("java_time_to_add_count{} 2\n"));
    assert!(body.contains("java_time_to_add_sum{} "));
}

#[tokio::test]
async fn test_scrape_is_idempotent() {
    let dispatcher = Dispatcher::new(local_config()).unwrap();
    let addr = dispatcher.before_start_thread().unwrap();
    let tree = InstrumentedTree::new(dispatcher.clone());
    tree.add(1u32);
    tree.add(2);

    let first = get(addr, "/metrics").await;
    let second = get(addr, "/metrics").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_health_and_unknown_paths() {
    let registry = Arc::new(Registry::new("java").unwrap());
    let server = assert_ok!(MetricsServer::start("127.0.0.1:0".parse().unwrap(), registry));

    let (status, body) = get(server.local_addr(), "/-/healthy").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, "Exporter is Healthy.");

    let (status, _) = get(server.local_addr(), "/admin").await;
    assert_eq!(status, "HTTP/1.1 404 Not Found");
}

#[tokio::test]
async fn test_name_filter_over_http() {
    let dispatcher = Dispatcher::new(local_config()).unwrap();
    let addr = dispatcher.before_start_thread().unwrap();

    let (_, body) = get(addr, "/metrics?name[]=java_number_of_nodes&name[]=java_time_to_add_count").await;
    assert!(body.contains("java_number_of_nodes{} 0"));
    assert!(body.contains("java_time_to_add_count{} 0"));
    assert!(!body.contains("java_number_of_iterations"));
}

#[test]
fn test_port_in_use_is_bind_error() {
    let first = MetricsServer::start("127.0.0.1:0".parse().unwrap(), Arc::new(Registry::new("a").unwrap())).unwrap();
    let result = MetricsServer::start(first.local_addr(), Arc::new(Registry::new("b").unwrap()));
    match result {
        Err(MetricsError::Bind { addr, .. }) => assert_eq!(addr, first.local_addr()),
        other => panic!("expected bind error, got {other:?}"),
    }
}
