use super::*;

fn launcher(timeout: Duration, command: Option<&str>) -> (Arc<WsSurfaceLauncher>, broadcast::Receiver<ServerEvent>) {
    let (events, events_rx) = broadcast::channel(16);
    (
        Arc::new(WsSurfaceLauncher::new(
            events,
            command.map(str::to_string),
            timeout,
        )),
        events_rx,
    )
}

async fn launch_request(events: &mut broadcast::Receiver<ServerEvent>) -> (SurfaceId, String) {
    loop {
        match events.recv().await.expect("event") {
            ServerEvent::DisplayLaunchRequested { surface_id, url, .. } => return (surface_id, url),
            _ => continue,
        }
    }
}

#[test]
fn attach_url_switches_to_websocket_scheme() {
    let id = SurfaceId::new();
    let url = attach_url("http://127.0.0.1:8080/display", id).expect("url");
    assert_eq!(
        url.as_str(),
        format!("ws://127.0.0.1:8080/display/ws?surface={id}")
    );

    let secure = attach_url("https://stage.example.org/display/", id).expect("url");
    assert_eq!(
        secure.as_str(),
        format!("wss://stage.example.org/display/ws?surface={id}")
    );
}

#[test]
fn attach_url_rejects_garbage() {
    assert!(attach_url("display", SurfaceId::new()).is_err());
}

#[tokio::test]
async fn launch_succeeds_when_client_attaches() {
    let (launcher, mut events) = launcher(Duration::from_secs(5), None);
    let dims = SurfaceDimensions::default();

    let launching = {
        let launcher = Arc::clone(&launcher);
        tokio::spawn(async move { launcher.launch("http://localhost:8080/display", dims).await })
    };

    let (surface_id, url) = launch_request(&mut events).await;
    assert!(url.starts_with("ws://localhost:8080/display/ws?surface="));
    let endpoint = launcher.claim(surface_id).await.expect("endpoint");
    assert_eq!(endpoint.id(), surface_id);

    let handle = launching.await.expect("join").expect("handle");
    assert_eq!(handle.id(), surface_id);
    assert_eq!(handle.is_closed().ok(), Some(false));

    drop(endpoint);
    assert_eq!(handle.is_closed().ok(), Some(true));
}

#[tokio::test]
async fn launch_without_client_is_refused() {
    let (launcher, mut events) = launcher(Duration::from_millis(50), None);

    let handle = launcher
        .launch("http://localhost:8080/display", SurfaceDimensions::default())
        .await;
    assert!(handle.is_none());

    let (surface_id, _) = launch_request(&mut events).await;
    assert!(launcher.claim(surface_id).await.is_none());
}

#[tokio::test]
async fn unknown_surface_cannot_be_claimed() {
    let (launcher, _events) = launcher(Duration::from_millis(50), None);
    assert!(launcher.claim(SurfaceId::new()).await.is_none());
}

#[tokio::test]
async fn failing_launch_command_is_refused() {
    let (launcher, _events) = launcher(
        Duration::from_secs(30),
        Some("/nonexistent/lyrics-presenter --url {url}"),
    );

    let handle = tokio::time::timeout(
        Duration::from_secs(5),
        launcher.launch("http://localhost:8080/display", SurfaceDimensions::default()),
    )
    .await
    .expect("refusal should not wait for the attach timeout");
    assert!(handle.is_none());
}
