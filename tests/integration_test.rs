use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use media_vault::upload::types::{CreateUploadRequest, ManagerConfig};
use media_vault::{
    Destination, ProgressSender, Transport, UploadCallbacks, UploadCompleted, UploadError,
    UploadEvent, UploadFile, UploadManager, UploadManagerHandle, UploadStatus, UploadTarget,
    UploadTargetProvider,
};

/// Issues `uploads/<n>-<name>` keys, refusing configured file names.
#[derive(Default)]
struct MockProvider {
    reject: HashMap<String, String>,
    requests: Mutex<Vec<CreateUploadRequest>>,
    counter: AtomicUsize,
}

#[async_trait::async_trait]
impl UploadTargetProvider for MockProvider {
    async fn request_upload(&self, request: &CreateUploadRequest) -> media_vault::Result<UploadTarget> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(message) = self.reject.get(&request.file_name) {
            return Err(UploadError::Rejected(message.clone()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let key = format!("uploads/{}-{}", n, request.file_name);

        Ok(UploadTarget {
            object_key: key.clone(),
            destination: Destination {
                endpoint: "https://bucket.example.com/".to_string(),
                required_fields: BTreeMap::from([("key".to_string(), key)]),
            },
        })
    }
}

/// Transfer held open until the test releases it.
struct Started {
    name: String,
    release: oneshot::Sender<media_vault::Result<()>>,
}

#[derive(Default)]
struct MockTransport {
    gate: Option<mpsc::UnboundedSender<Started>>,
    ticks: Vec<(u64, Option<u64>)>,
    delay: Option<Duration>,
    hang: bool,
    fail: HashMap<String, (u16, Option<String>)>,
    panic_on: HashSet<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<String>>,
    destinations: Mutex<Vec<Destination>>,
}

impl MockTransport {
    async fn transfer(&self, file: &UploadFile, progress: &ProgressSender) -> media_vault::Result<()> {
        let name = file.name().to_string();
        if self.panic_on.contains(&name) {
            panic!("transport exploded on {}", name);
        }

        for (loaded, total) in &self.ticks {
            progress.report(*loaded, *total);
        }

        if let Some(gate) = &self.gate {
            let (release, wait) = oneshot::channel();
            let _ = gate.send(Started { name: name.clone(), release });
            wait.await.map_err(|_| UploadError::internal_error("gate dropped"))??;
        }

        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((status, message)) = self.fail.get(&name) {
            return Err(UploadError::server_error(*status, message.clone()));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, destination: &Destination, file: &UploadFile, progress: ProgressSender) -> media_vault::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(file.name().to_string());
        self.destinations.lock().unwrap().push(destination.clone());

        let result = self.transfer(file, &progress).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn image(name: &str) -> UploadFile {
    UploadFile::new(name, "image/png", vec![0u8; 1000])
}

fn images(count: usize) -> Vec<UploadFile> {
    (0..count).map(|i| image(&format!("{}.png", i))).collect()
}

fn manager(
    provider: Arc<MockProvider>,
    transport: Arc<MockTransport>,
    max_parallel: usize,
    callbacks: UploadCallbacks,
) -> UploadManagerHandle {
    UploadManager::builder(provider, transport)
        .config(ManagerConfig {
            event_capacity: 4096,
            ..Default::default()
        })
        .max_parallel(max_parallel)
        .callbacks(callbacks)
        .build()
}

/// Read events until `count` tasks reached a terminal status.
async fn collect_until_settled(events: &mut broadcast::Receiver<UploadEvent>, count: usize) -> Vec<UploadEvent> {
    let mut collected = Vec::new();
    let mut settled = 0;

    timeout(Duration::from_secs(5), async {
        while settled < count {
            let event = events.recv().await.expect("event stream closed");
            if let UploadEvent::Progress(progress) = &event {
                if progress.status.is_terminal() {
                    settled += 1;
                }
            }
            collected.push(event);
        }
    })
    .await
    .expect("timed out waiting for uploads to settle");

    collected
}

fn progress_of(events: &[UploadEvent], id: media_vault::UploadId) -> Vec<media_vault::UploadProgress> {
    events
        .iter()
        .filter_map(|event| match event {
            UploadEvent::Progress(progress) if progress.id == id => Some(progress.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_five_files_three_slots() {
    let (gate_tx, mut gate_rx) = mpsc::unbounded_channel();
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        gate: Some(gate_tx),
        ..Default::default()
    });
    let handle = manager(provider, transport.clone(), 3, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(images(5)).await.unwrap();
    assert_eq!(ids.len(), 5);

    let snapshot = handle.manager.all_progress().await.unwrap();
    let statuses: Vec<_> = snapshot.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![
            UploadStatus::Uploading,
            UploadStatus::Uploading,
            UploadStatus::Uploading,
            UploadStatus::Idle,
            UploadStatus::Idle,
        ]
    );

    let stats = handle.manager.stats().await.unwrap();
    assert_eq!((stats.active, stats.queued, stats.max_parallel), (3, 2, 3));

    let mut started = Vec::new();
    for _ in 0..3 {
        started.push(timeout(Duration::from_secs(1), gate_rx.recv()).await.unwrap().unwrap());
    }
    let mut names: Vec<_> = started.iter().map(|s| s.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["0.png", "1.png", "2.png"]);

    // Queued tasks have only their idle event so far
    assert!(timeout(Duration::from_millis(100), gate_rx.recv()).await.is_err());
    let mut early = Vec::new();
    while let Ok(event) = events.try_recv() {
        early.push(event);
    }
    for id in &ids[3..] {
        let progress = progress_of(&early, *id);
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].status, UploadStatus::Idle);
    }

    // One slot frees up, the fourth file is admitted
    let first = started.remove(0);
    first.release.send(Ok(())).unwrap();
    let fourth = timeout(Duration::from_secs(1), gate_rx.recv()).await.unwrap().unwrap();
    assert_eq!(fourth.name, "3.png");

    for started in started {
        started.release.send(Ok(())).unwrap();
    }
    fourth.release.send(Ok(())).unwrap();
    let fifth = timeout(Duration::from_secs(1), gate_rx.recv()).await.unwrap().unwrap();
    assert_eq!(fifth.name, "4.png");
    fifth.release.send(Ok(())).unwrap();

    handle.shutdown().await.unwrap();
    assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(transport.started.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn test_dispatch_follows_enqueue_order() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        delay: Some(Duration::from_millis(5)),
        ..Default::default()
    });
    let handle = manager(provider, transport.clone(), 1, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    handle.manager.enqueue(images(4)).await.unwrap();
    collect_until_settled(&mut events, 4).await;

    assert_eq!(
        *transport.started.lock().unwrap(),
        vec!["0.png", "1.png", "2.png", "3.png"]
    );
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_event_shape_per_task() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        ticks: vec![(600, Some(1000)), (300, Some(1000)), (1000, Some(1000))],
        ..Default::default()
    });
    let handle = manager(provider, transport, 2, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(images(4)).await.unwrap();
    let collected = collect_until_settled(&mut events, 4).await;

    for id in ids {
        let progress = progress_of(&collected, id);
        assert_eq!(progress.first().unwrap().status, UploadStatus::Idle);
        assert_eq!(progress.iter().filter(|p| p.status == UploadStatus::Idle).count(), 1);
        assert_eq!(progress.iter().filter(|p| p.status.is_terminal()).count(), 1);

        let last = progress.last().unwrap();
        assert_eq!(last.status, UploadStatus::Success);
        assert_eq!(last.percent, 100.0);

        let uploading: Vec<_> = progress
            .iter()
            .filter(|p| p.status == UploadStatus::Uploading)
            .map(|p| p.percent)
            .collect();
        assert_eq!(uploading, vec![0.0, 60.0, 100.0]);
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_partial_progress_reports_exact_percent() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        ticks: vec![(512_000, Some(1_000_000))],
        ..Default::default()
    });
    let handle = manager(provider, transport, 3, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(vec![image("half.png")]).await.unwrap();
    let collected = collect_until_settled(&mut events, 1).await;

    let percents: Vec<_> = progress_of(&collected, ids[0]).iter().map(|p| p.percent).collect();
    assert_eq!(percents, vec![0.0, 0.0, 51.2, 100.0]);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_issuance_failure_settles_without_transfer() {
    let provider = Arc::new(MockProvider {
        reject: HashMap::from([("a.png".to_string(), "Only image uploads are supported.".to_string())]),
        ..Default::default()
    });
    let transport = Arc::new(MockTransport::default());
    let handle = manager(provider.clone(), transport.clone(), 1, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(vec![image("a.png"), image("b.png")]).await.unwrap();
    let collected = collect_until_settled(&mut events, 2).await;

    let failed = progress_of(&collected, ids[0]);
    let last = failed.last().unwrap();
    assert_eq!(last.status, UploadStatus::Error);
    assert_eq!(last.error.as_deref(), Some("Only image uploads are supported."));
    assert_eq!(last.percent, 0.0);

    // Slot freed for the sibling, which went through
    assert_eq!(progress_of(&collected, ids[1]).last().unwrap().status, UploadStatus::Success);
    assert_eq!(*transport.started.lock().unwrap(), vec!["b.png"]);
    assert_eq!(provider.requests.lock().unwrap().len(), 2);

    let preview_url = collected
        .iter()
        .find_map(|event| match event {
            UploadEvent::Preview(preview) if preview.id == ids[0] => Some(preview.url.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(handle.manager.resolve_preview(&preview_url).await.unwrap(), None);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_transfer_failure_uses_body_message() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        ticks: vec![(400, Some(1000))],
        fail: HashMap::from([
            ("denied.png".to_string(), (403, Some("Policy expired".to_string()))),
            ("broken.png".to_string(), (502, None)),
        ]),
        ..Default::default()
    });
    let handle = manager(provider, transport, 3, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    let ids = handle
        .manager
        .enqueue(vec![image("denied.png"), image("broken.png"), image("fine.png")])
        .await
        .unwrap();
    let collected = collect_until_settled(&mut events, 3).await;

    let denied = progress_of(&collected, ids[0]);
    let denied = denied.last().unwrap();
    assert_eq!(denied.status, UploadStatus::Error);
    assert_eq!(denied.error.as_deref(), Some("Policy expired"));
    // Last known percent is kept on failure
    assert_eq!(denied.percent, 40.0);

    let broken = progress_of(&collected, ids[1]);
    assert_eq!(broken.last().unwrap().error.as_deref(), Some("Upload failed with status 502"));

    assert_eq!(progress_of(&collected, ids[2]).last().unwrap().status, UploadStatus::Success);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_completion_key_matches_issued_key() {
    let completed = Arc::new(Mutex::new(Vec::<UploadCompleted>::new()));
    let callbacks = UploadCallbacks::new().on_complete({
        let completed = completed.clone();
        move |result| completed.lock().unwrap().push(result.clone())
    });

    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport::default());
    let handle = manager(provider, transport.clone(), 3, callbacks);
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(vec![image("cat.png")]).await.unwrap();
    collect_until_settled(&mut events, 1).await;
    handle.shutdown().await.unwrap();

    let completed = completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, ids[0]);
    assert_eq!(completed[0].object_key, "uploads/0-cat.png");

    let destinations = transport.destinations.lock().unwrap();
    assert_eq!(destinations[0].required_fields["key"], completed[0].object_key);
}

#[tokio::test]
async fn test_previews_released_before_terminal_event() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        delay: Some(Duration::from_millis(2)),
        ..Default::default()
    });
    let handle = manager(provider, transport, 2, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    handle.manager.enqueue(images(3)).await.unwrap();

    let mut previews = HashMap::new();
    let mut settled = 0;
    while settled < 3 {
        let event = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        match event {
            UploadEvent::Preview(preview) => {
                previews.insert(preview.id, preview.url);
            }
            UploadEvent::Progress(progress) if progress.status.is_terminal() => {
                settled += 1;
                let url = &previews[&progress.id];
                assert_eq!(handle.manager.resolve_preview(url).await.unwrap(), None);
            }
            _ => {}
        }
    }

    assert_eq!(previews.len(), 3);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_live_preview_resolves_to_file_bytes() {
    let (gate_tx, mut gate_rx) = mpsc::unbounded_channel();
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        gate: Some(gate_tx),
        ..Default::default()
    });
    let handle = manager(provider, transport, 1, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    handle
        .manager
        .enqueue(vec![UploadFile::new("dot.png", "image/png", vec![9u8, 9, 9])])
        .await
        .unwrap();

    let url = match events.recv().await.unwrap() {
        UploadEvent::Preview(preview) => preview.url,
        other => panic!("Expected preview first, got {:?}", other),
    };
    assert_eq!(
        handle.manager.resolve_preview(&url).await.unwrap().as_deref(),
        Some(&[9u8, 9, 9][..])
    );

    let started = timeout(Duration::from_secs(1), gate_rx.recv()).await.unwrap().unwrap();
    started.release.send(Ok(())).unwrap();
    collect_until_settled(&mut events, 1).await;
    assert_eq!(handle.manager.resolve_preview(&url).await.unwrap(), None);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_submit_rejects_without_events() {
    let rejected = Arc::new(AtomicUsize::new(0));
    let callbacks = UploadCallbacks::new().on_rejected({
        let rejected = rejected.clone();
        move |_| {
            rejected.fetch_add(1, Ordering::SeqCst);
        }
    });

    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport::default());
    let handle = manager(provider, transport.clone(), 3, callbacks);
    let mut events = handle.manager.subscribe_events();

    let huge = UploadFile::new("huge.png", "image/png", vec![0u8; 10 * 1024 * 1024 + 1]);
    let notes = UploadFile::new("notes.txt", "text/plain", b"hello".to_vec());
    let submission = handle
        .manager
        .submit(vec![notes, image("ok.png"), huge])
        .await
        .unwrap();

    assert_eq!(submission.accepted.len(), 1);
    assert_eq!(submission.rejected.len(), 2);
    assert_eq!(submission.rejected[0].file_name, "notes.txt");
    assert_eq!(submission.rejected[0].reason, "Only image files are allowed.");
    assert_eq!(submission.rejected[1].file_name, "huge.png");
    assert_eq!(submission.rejected[1].reason, "File exceeds the 10MB size limit.");
    assert_eq!(rejected.load(Ordering::SeqCst), 2);

    let collected = collect_until_settled(&mut events, 1).await;
    let rejections = collected
        .iter()
        .filter(|event| matches!(event, UploadEvent::Rejected(_)))
        .count();
    assert_eq!(rejections, 2);

    for event in &collected {
        match event {
            UploadEvent::Preview(preview) => assert_eq!(preview.name, "ok.png"),
            UploadEvent::Progress(progress) => assert_eq!(progress.file_name, "ok.png"),
            _ => {}
        }
    }

    assert_eq!(*transport.started.lock().unwrap(), vec!["ok.png"]);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transfer_timeout_settles_as_error() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        hang: true,
        ..Default::default()
    });
    let handle = UploadManager::builder(provider, transport)
        .transfer_timeout(Some(Duration::from_secs(1)))
        .build();
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(vec![image("slow.png")]).await.unwrap();
    let collected = collect_until_settled(&mut events, 1).await;

    let last = progress_of(&collected, ids[0]).pop().unwrap();
    assert_eq!(last.status, UploadStatus::Error);
    assert_eq!(last.error.as_deref(), Some("Upload timed out after 1s"));

    let stats = handle.manager.stats().await.unwrap();
    assert_eq!((stats.active, stats.queued), (0, 0));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_panicking_transport_frees_slot() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        panic_on: HashSet::from(["boom.png".to_string()]),
        ..Default::default()
    });
    let handle = manager(provider, transport, 1, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(vec![image("boom.png"), image("next.png")]).await.unwrap();
    let collected = collect_until_settled(&mut events, 2).await;

    let boom = progress_of(&collected, ids[0]).pop().unwrap();
    assert_eq!(boom.status, UploadStatus::Error);
    assert!(boom.error.unwrap().starts_with("Internal error: Upload task panicked"));
    assert_eq!(progress_of(&collected, ids[1]).pop().unwrap().status, UploadStatus::Success);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_enqueue_respects_capacity() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        delay: Some(Duration::from_millis(3)),
        ..Default::default()
    });
    let handle = manager(provider, transport.clone(), 3, UploadCallbacks::new());
    let mut events = handle.manager.subscribe_events();

    let mut producers = Vec::new();
    for batch in 0..5 {
        let manager = handle.manager.clone();
        producers.push(tokio::spawn(async move {
            let files = (0..4).map(|i| image(&format!("{}-{}.png", batch, i))).collect();
            manager.enqueue(files).await.unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for producer in producers {
        ids.extend(producer.await.unwrap());
    }
    assert_eq!(ids.len(), 20);

    collect_until_settled(&mut events, 20).await;
    assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(transport.started.lock().unwrap().len(), 20);

    let cleared = handle.manager.clear_settled().await.unwrap();
    assert_eq!(cleared, 20);
    assert!(handle.manager.all_progress().await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_accepted_tasks() {
    let settled = Arc::new(AtomicUsize::new(0));
    let callbacks = UploadCallbacks::new().on_progress({
        let settled = settled.clone();
        move |progress| {
            if progress.status.is_terminal() {
                settled.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        delay: Some(Duration::from_millis(5)),
        ..Default::default()
    });
    let handle = manager(provider, transport, 2, callbacks);

    let manager = handle.manager.clone();
    manager.enqueue(images(4)).await.unwrap();
    drop(manager);

    handle.shutdown().await.unwrap();
    assert_eq!(settled.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_filtered_subscription_sees_only_completions() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport {
        ticks: vec![(500, Some(1000))],
        ..Default::default()
    });
    let handle = manager(provider, transport, 2, UploadCallbacks::new());
    let mut completions = handle
        .manager
        .subscribe_filtered(|event| matches!(event, UploadEvent::Completed(_)) && event.upload_id().is_some());

    let ids = handle.manager.enqueue(images(3)).await.unwrap();

    let mut seen = HashSet::new();
    for _ in 0..3 {
        match timeout(Duration::from_secs(5), completions.recv()).await.unwrap().unwrap() {
            UploadEvent::Completed(completed) => {
                seen.insert(completed.id);
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    assert_eq!(seen, ids.into_iter().collect::<HashSet<_>>());
    let snapshot = handle.manager.progress(*seen.iter().next().unwrap()).await.unwrap().unwrap();
    assert_eq!(snapshot.status, UploadStatus::Success);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wait_settled_survives_lagging_subscriber() {
    let provider = Arc::new(MockProvider::default());
    let ticks = (1..=40).map(|n| (n * 25, Some(1000))).collect();
    let transport = Arc::new(MockTransport {
        ticks,
        delay: Some(Duration::from_millis(2)),
        ..Default::default()
    });
    let handle = UploadManager::builder(provider, transport)
        .config(ManagerConfig {
            event_capacity: 16,
            ..Default::default()
        })
        .build();
    let mut events = handle.manager.subscribe_events();

    let ids = handle.manager.enqueue(images(12)).await.unwrap();

    // Slow consumer that falls behind while uploads settle
    let mut lagged = false;
    let outcomes = {
        let settled = handle.manager.wait_settled(&ids);
        tokio::pin!(settled);
        timeout(Duration::from_secs(5), async {
            loop {
                tokio::select! {
                    outcomes = &mut settled => break outcomes.unwrap(),
                    event = events.recv() => match event {
                        Ok(UploadEvent::Completed(_)) => tokio::time::sleep(Duration::from_millis(20)).await,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => lagged = true,
                        Err(broadcast::error::RecvError::Closed) => unreachable!(),
                    },
                }
            }
        })
        .await
        .expect("waiting for settled uploads hung")
    };

    assert!(lagged);
    assert_eq!(outcomes.iter().map(|p| p.id).collect::<Vec<_>>(), ids);
    assert!(outcomes.iter().all(|p| p.status == UploadStatus::Success));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wait_settled_returns_immediately_for_settled_or_unknown_ids() {
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport::default());
    let handle = manager(provider, transport, 2, UploadCallbacks::new());

    let ids = handle.manager.enqueue(images(2)).await.unwrap();
    let first = handle.manager.wait_settled(&ids).await.unwrap();
    assert_eq!(first.len(), 2);

    let mut again = ids.clone();
    again.push(media_vault::UploadId::new());
    let second = timeout(Duration::from_secs(1), handle.manager.wait_settled(&again))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, first);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_panicking_callback_keeps_manager_alive() {
    let callbacks = UploadCallbacks::new().on_complete(|_| panic!("host callback failed"));
    let provider = Arc::new(MockProvider::default());
    let transport = Arc::new(MockTransport::default());
    let handle = manager(provider, transport, 1, callbacks);

    let ids = handle.manager.enqueue(images(3)).await.unwrap();
    let outcomes = timeout(Duration::from_secs(5), handle.manager.wait_settled(&ids))
        .await
        .unwrap()
        .unwrap();

    assert!(outcomes.iter().all(|p| p.status == UploadStatus::Success));
    let stats = handle.manager.stats().await.unwrap();
    assert_eq!((stats.active, stats.queued), (0, 0));
    handle.shutdown().await.unwrap();
}
