use greeting_server::{ServerRunner, Shutdown, ShutdownTrigger, services::HealthServices};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tonic::transport::Endpoint;
use tonic_health::pb::{
    HealthCheckRequest, health_check_response::ServingStatus, health_client::HealthClient,
};

#[tokio::test]
async fn drain_waits_for_open_calls_and_reports_not_serving() {
    let runner = ServerRunner::bind("127.0.0.1:0").await.unwrap();
    let addr = runner.local_addr();
    let shutdown = Shutdown::new();
    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { runner.serve(&HealthServices::new(), shutdown).await }
    });

    let channel = Endpoint::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .expect("client should connect");
    let mut client = HealthClient::new(channel);
    let mut updates = client
        .watch(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .expect("watch should start")
        .into_inner();

    let first = updates.message().await.unwrap().expect("initial status");
    assert_eq!(first.status, ServingStatus::Serving as i32);

    shutdown.trigger(ShutdownTrigger::Terminate);

    let next = timeout(Duration::from_secs(5), updates.message())
        .await
        .expect("status update should arrive")
        .unwrap()
        .expect("stream should still be open");
    assert_eq!(next.status, ServingStatus::NotServing as i32);

    // The watch call is still in flight, so the server keeps draining.
    sleep(Duration::from_millis(200)).await;
    assert!(!server.is_finished());

    drop(updates);
    drop(client);

    timeout(Duration::from_secs(5), server)
        .await
        .expect("server should finish once the call ends")
        .expect("server task should not panic")
        .expect("server should stop cleanly");
    assert_eq!(shutdown.fired_by(), Some(ShutdownTrigger::Terminate));
}

#[tokio::test]
async fn listener_is_released_after_shutdown() {
    let runner = ServerRunner::bind("127.0.0.1:0").await.unwrap();
    let addr = runner.local_addr();
    let shutdown = Shutdown::new();

    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { runner.serve(&HealthServices::new(), shutdown).await }
    });
    sleep(Duration::from_millis(50)).await;

    shutdown.trigger(ShutdownTrigger::Requested);
    timeout(Duration::from_secs(1), server)
        .await
        .expect("idle server should stop promptly")
        .unwrap()
        .unwrap();

    tokio::net::TcpListener::bind(addr)
        .await
        .expect("port should be free after shutdown");
}
