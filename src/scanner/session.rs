use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::retry::RetryPolicy;
use crate::domain::errors::DomainError;
use crate::domain::ports::VerifyTransport;
use crate::domain::redemption::{OperatorCredentials, VerifyOutcome};

use super::decode::{select_decoder, CameraDevice, CameraError, FrameStream};

#[derive(Debug, Clone, PartialEq)]
pub enum ScanState {
    Idle,
    RequestingCamera,
    Streaming,
    Decoding,
    Submitting,
    /// A resolved verification (or a transport failure after the retry
    /// budget). Transport failures leave the camera loop running so the
    /// operator can immediately rescan.
    Result(Result<VerifyOutcome, String>),
    Stopped,
    Error(CameraError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorWorkflow {
    /// Release the camera once a scan resolves; the result stays on screen.
    StopAfterResult,
    /// Keep streaming for the next attendee.
    ContinueScanning,
}

/// The single owned handle to a running scan session.
///
/// Stopping (or just dropping) the handle cancels the decode loop at its next
/// await point and releases the capture stream; no polling outlives the
/// handle.
pub struct ScanHandle {
    state_rx: watch::Receiver<ScanState>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScanHandle {
    pub fn state(&self) -> ScanState {
        self.state_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ScanState> {
        self.state_rx.clone()
    }

    /// Explicit stop: tear down the capture stream and wait for the loop to
    /// acknowledge.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }

    /// Wait for the session to end on its own (terminal result or error).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

pub struct ScanSession;

impl ScanSession {
    /// Spawn the scan loop:
    /// `Idle → RequestingCamera → Streaming → Decoding ⇄ Submitting → Result`,
    /// with `Error` out of camera acquisition and `Stopped` out of any
    /// camera-active state via the returned handle.
    pub fn start<C, V>(
        device: C,
        transport: V,
        credentials: OperatorCredentials,
        workflow: OperatorWorkflow,
        retry: RetryPolicy,
    ) -> ScanHandle
    where
        C: CameraDevice + 'static,
        V: VerifyTransport + 'static,
    {
        let (state_tx, state_rx) = watch::channel(ScanState::Idle);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            device,
            transport,
            credentials,
            workflow,
            retry,
            state_tx,
            stop_rx,
        ));
        ScanHandle {
            state_rx,
            stop_tx,
            task,
        }
    }
}

async fn run_loop<C, V>(
    device: C,
    transport: V,
    credentials: OperatorCredentials,
    workflow: OperatorWorkflow,
    retry: RetryPolicy,
    state: watch::Sender<ScanState>,
    mut stop: watch::Receiver<bool>,
) where
    C: CameraDevice,
    V: VerifyTransport,
{
    let _ = state.send(ScanState::RequestingCamera);
    let opened = tokio::select! {
        _ = stop.changed() => {
            let _ = state.send(ScanState::Stopped);
            return;
        }
        opened = device.open() => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            let _ = state.send(ScanState::Error(e));
            return;
        }
    };

    // Strategy is chosen once per session, not re-probed per frame.
    let mut decoder = select_decoder(&device);
    let _ = state.send(ScanState::Streaming);

    let mut last_code: Option<String> = None;
    loop {
        let _ = state.send(ScanState::Decoding);
        // Awaiting the next frame is the cooperative cadence; a stop signal
        // (or a dropped handle) cancels the pending capture right here.
        let frame = tokio::select! {
            _ = stop.changed() => {
                drop(stream);
                let _ = state.send(ScanState::Stopped);
                return;
            }
            frame = stream.next_frame() => frame,
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                drop(stream);
                let _ = state.send(ScanState::Error(e));
                return;
            }
        };

        let Some(code) = decoder.decode(&frame) else {
            continue;
        };
        if last_code.as_deref() == Some(code.as_str()) {
            // The same code is still in front of the camera.
            continue;
        }

        // Exactly one verification in flight: the loop does not read frames
        // again until this call resolves.
        let _ = state.send(ScanState::Submitting);
        let result = retry
            .run_async(|| transport.verify(&credentials, &code))
            .await;
        match result {
            Ok(outcome) => {
                last_code = Some(code);
                let _ = state.send(ScanState::Result(Ok(outcome)));
                if workflow == OperatorWorkflow::StopAfterResult {
                    // Release the capture device; the result stays current.
                    drop(stream);
                    return;
                }
            }
            Err(e) => {
                // Retry budget exhausted. Forget the code so the operator can
                // rescan the same ticket, and keep the camera running.
                let _ = state.send(ScanState::Result(Err(e.to_string())));
            }
        }
    }
}

/// Manual text entry: bypasses the camera states entirely and verifies the
/// typed code directly. Usable whenever no scan is in flight.
pub async fn verify_manual<V>(
    transport: &V,
    credentials: &OperatorCredentials,
    code: &str,
    retry: RetryPolicy,
) -> Result<VerifyOutcome, DomainError>
where
    V: VerifyTransport + ?Sized,
{
    let code = code.trim();
    if code.is_empty() {
        return Err(DomainError::InvalidInput("empty ticket code".to_string()));
    }
    retry.run_async(|| transport.verify(credentials, code)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::redemption::ScanRecord;
    use crate::scanner::decode::{Frame, QrDecoder};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // ── Fakes ────────────────────────────────────────────────────────────────

    /// Frames whose luma bytes carry the code to "decode"; empty luma means
    /// no code visible in the frame.
    fn code_frame(code: &str) -> Frame {
        Frame {
            width: 0,
            height: 0,
            luma: code.as_bytes().to_vec(),
        }
    }

    fn blank_frame() -> Frame {
        Frame {
            width: 0,
            height: 0,
            luma: vec![],
        }
    }

    struct FakeNativeDecoder;

    impl QrDecoder for FakeNativeDecoder {
        fn decode(&mut self, frame: &Frame) -> Option<String> {
            if frame.luma.is_empty() {
                None
            } else {
                Some(String::from_utf8(frame.luma.clone()).unwrap())
            }
        }
    }

    struct FakeStream {
        frames: VecDeque<Frame>,
        released: Arc<AtomicBool>,
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FrameStream for FakeStream {
        async fn next_frame(&mut self) -> Result<Frame, CameraError> {
            match self.frames.pop_front() {
                Some(frame) => {
                    // Mimic the device's frame cadence.
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok(frame)
                }
                None => {
                    // No more staged frames: behave like a camera pointed at
                    // nothing, pending until cancelled.
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    struct FakeCamera {
        frames: Mutex<Option<VecDeque<Frame>>>,
        released: Arc<AtomicBool>,
        deny: bool,
    }

    impl FakeCamera {
        fn with_frames(frames: Vec<Frame>) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                FakeCamera {
                    frames: Mutex::new(Some(frames.into())),
                    released: released.clone(),
                    deny: false,
                },
                released,
            )
        }

        fn denied() -> Self {
            FakeCamera {
                frames: Mutex::new(None),
                released: Arc::new(AtomicBool::new(false)),
                deny: true,
            }
        }
    }

    #[async_trait]
    impl CameraDevice for FakeCamera {
        type Stream = FakeStream;

        async fn open(&self) -> Result<FakeStream, CameraError> {
            if self.deny {
                return Err(CameraError::PermissionDenied);
            }
            let frames = self
                .frames
                .lock()
                .unwrap()
                .take()
                .expect("stream opened twice");
            Ok(FakeStream {
                frames,
                released: self.released.clone(),
            })
        }

        fn native_decoder(&self) -> Option<Box<dyn QrDecoder>> {
            Some(Box::new(FakeNativeDecoder))
        }
    }

    #[derive(Clone)]
    struct FakeTransport {
        calls: Arc<Mutex<Vec<String>>>,
        fail_first: Arc<AtomicBool>,
    }

    impl FakeTransport {
        fn new() -> Self {
            FakeTransport {
                calls: Arc::new(Mutex::new(Vec::new())),
                fail_first: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failing_once() -> Self {
            let transport = Self::new();
            transport.fail_first.store(true, Ordering::SeqCst);
            transport
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VerifyTransport for FakeTransport {
        async fn verify(
            &self,
            _credentials: &OperatorCredentials,
            code: &str,
        ) -> Result<VerifyOutcome, DomainError> {
            self.calls.lock().unwrap().push(code.to_string());
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(DomainError::TransientStore("gate offline".to_string()));
            }
            Ok(VerifyOutcome::Valid(ScanRecord {
                scan_count: 1,
                total_quantity: 1,
                holder_name: "Alex Johnson".to_string(),
                event_title: "Comedy Special".to_string(),
            }))
        }
    }

    fn creds() -> OperatorCredentials {
        OperatorCredentials {
            token: "gate-secret".to_string(),
        }
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            backoff: Duration::from_millis(1),
        }
    }

    async fn wait_for_state(
        mut rx: watch::Receiver<ScanState>,
        pred: impl Fn(&ScanState) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if pred(&rx.borrow().clone()) {
                    return;
                }
                rx.changed().await.expect("session ended unexpectedly");
            }
        })
        .await
        .expect("state never reached");
    }

    /// Poll until the transport has seen `expected` submissions. The watch
    /// channel only retains the latest state, so call counts are the reliable
    /// signal while the loop keeps scanning.
    async fn wait_for_calls(transport: &FakeTransport, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.calls().len() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("submission count never reached");
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn permission_denied_enters_error_state() {
        let transport = FakeTransport::new();
        let handle = ScanSession::start(
            FakeCamera::denied(),
            transport.clone(),
            creds(),
            OperatorWorkflow::ContinueScanning,
            no_retry(),
        );
        let state_rx = handle.watch_state();
        handle.join().await;
        assert_eq!(
            *state_rx.borrow(),
            ScanState::Error(CameraError::PermissionDenied)
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_cancels_the_loop_and_releases_the_camera() {
        let (camera, released) = FakeCamera::with_frames(vec![blank_frame()]);
        let handle = ScanSession::start(
            camera,
            FakeTransport::new(),
            creds(),
            OperatorWorkflow::ContinueScanning,
            no_retry(),
        );
        wait_for_state(handle.watch_state(), |s| *s == ScanState::Decoding).await;
        let state_rx = handle.watch_state();
        handle.stop().await;
        assert_eq!(*state_rx.borrow(), ScanState::Stopped);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_the_handle_also_tears_the_loop_down() {
        let (camera, released) = FakeCamera::with_frames(vec![]);
        let handle = ScanSession::start(
            camera,
            FakeTransport::new(),
            creds(),
            OperatorWorkflow::ContinueScanning,
            no_retry(),
        );
        wait_for_state(handle.watch_state(), |s| *s == ScanState::Decoding).await;
        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), async {
            while !released.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("camera was never released");
    }

    #[tokio::test]
    async fn same_visible_code_is_submitted_exactly_once() {
        let (camera, _released) = FakeCamera::with_frames(vec![
            code_frame("A1B2C3D4E5F6"),
            code_frame("A1B2C3D4E5F6"),
            code_frame("A1B2C3D4E5F6"),
        ]);
        let transport = FakeTransport::new();
        let handle = ScanSession::start(
            camera,
            transport.clone(),
            creds(),
            OperatorWorkflow::ContinueScanning,
            no_retry(),
        );
        wait_for_calls(&transport, 1).await;
        // Give the loop time to (wrongly) resubmit the repeated frames.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.calls(), vec!["A1B2C3D4E5F6".to_string()]);
        handle.stop().await;
    }

    #[tokio::test]
    async fn distinct_codes_submit_in_order() {
        let (camera, _released) = FakeCamera::with_frames(vec![
            code_frame("CODEAAAAAAAA"),
            code_frame("CODEAAAAAAAA"),
            code_frame("CODEBBBBBBBB"),
        ]);
        let transport = FakeTransport::new();
        let handle = ScanSession::start(
            camera,
            transport.clone(),
            creds(),
            OperatorWorkflow::ContinueScanning,
            no_retry(),
        );
        wait_for_calls(&transport, 2).await;
        assert_eq!(
            transport.calls(),
            vec!["CODEAAAAAAAA".to_string(), "CODEBBBBBBBB".to_string()]
        );
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_after_result_releases_camera_and_keeps_the_outcome() {
        let (camera, released) = FakeCamera::with_frames(vec![code_frame("A1B2C3D4E5F6")]);
        let transport = FakeTransport::new();
        let handle = ScanSession::start(
            camera,
            transport.clone(),
            creds(),
            OperatorWorkflow::StopAfterResult,
            no_retry(),
        );
        let state_rx = handle.watch_state();
        handle.join().await;
        match &*state_rx.borrow() {
            ScanState::Result(Ok(VerifyOutcome::Valid(record))) => {
                assert_eq!(record.holder_name, "Alex Johnson");
            }
            other => panic!("expected a valid result, got {other:?}"),
        }
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_keeps_the_camera_loop_alive() {
        // The first submission fails after the retry budget; the same code is
        // rescanned and succeeds.
        let (camera, _released) = FakeCamera::with_frames(vec![
            code_frame("A1B2C3D4E5F6"),
            code_frame("A1B2C3D4E5F6"),
        ]);
        let transport = FakeTransport::failing_once();
        let handle = ScanSession::start(
            camera,
            transport.clone(),
            creds(),
            OperatorWorkflow::StopAfterResult,
            no_retry(),
        );
        let state_rx = handle.watch_state();
        handle.join().await;
        assert!(matches!(
            &*state_rx.borrow(),
            ScanState::Result(Ok(VerifyOutcome::Valid(_)))
        ));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn manual_entry_bypasses_camera_states() {
        let transport = FakeTransport::new();
        let outcome = verify_manual(&transport, &creds(), "  A1B2C3D4E5F6  ", no_retry())
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::Valid(_)));
        assert_eq!(transport.calls(), vec!["A1B2C3D4E5F6".to_string()]);
    }

    #[tokio::test]
    async fn manual_entry_rejects_empty_codes() {
        let transport = FakeTransport::new();
        let result = verify_manual(&transport, &creds(), "   ", no_retry()).await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
        assert!(transport.calls().is_empty());
    }
}
