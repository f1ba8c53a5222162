use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;

use tokio::sync::Notify;

use super::*;
use crate::export::config::ExportConfig;
use crate::export::ffmpeg::RenderJob;
use crate::foundation::core::{Affine, MediaTime};
use crate::media::probe::{AssetInfo, AudioTrackInfo, VideoTrackInfo};
use crate::session::main_context::MainContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Behaviour {
    Succeed,
    Fail,
    WaitForCancel,
}

struct FakeBackend {
    behaviour: Behaviour,
    written: Arc<Notify>,
}

impl RenderBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn render(&self, job: &RenderJob<'_>, cancel: &CancelToken) -> ExportResult<()> {
        tokio::fs::write(job.output_path, b"partial").await?;
        self.written.notify_one();
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(ExportError::render("encoder exploded")),
            Behaviour::WaitForCancel => {
                cancel.cancelled().await;
                Err(ExportError::Cancelled)
            }
        }
    }
}

struct FakeProbe;

impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> ExportResult<AssetInfo> {
        Ok(AssetInfo {
            path: path.to_path_buf(),
            duration: MediaTime::new(10, 1)?,
            video_tracks: vec![VideoTrackInfo {
                stream_index: 0,
                natural_size: Size::new(1920.0, 1080.0),
                preferred_transform: Affine::IDENTITY,
                duration: None,
                frame_rate: None,
            }],
            audio_tracks: vec![AudioTrackInfo {
                stream_index: 1,
                duration: None,
            }],
        })
    }
}

#[derive(Debug, PartialEq)]
enum Event {
    Done(u32, u32),
    DoneVideo(PathBuf),
    Cancelled,
}

#[derive(Default)]
struct RecordingDelegate {
    events: Mutex<Vec<Event>>,
}

impl RecordingDelegate {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EditorDelegate for RecordingDelegate {
    fn on_edit_done(&self, photo: RgbaImage) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Done(photo.width(), photo.height()));
    }

    fn on_edit_done_video(&self, location: PathBuf) {
        self.events.lock().unwrap().push(Event::DoneVideo(location));
    }

    fn on_edit_cancelled(&self) {
        self.events.lock().unwrap().push(Event::Cancelled);
    }
}

struct TempDir(PathBuf);

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

struct Fixture {
    dir: TempDir,
    ctx: MainContext,
    delegate: Arc<RecordingDelegate>,
    written: Arc<Notify>,
    session: EditorSession<FakeBackend, FakeProbe>,
}

impl Fixture {
    fn new(media: Media, behaviour: Behaviour) -> Self {
        let dir = std::env::temp_dir().join(format!("clipmark-session-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = ExportConfig {
            output_dir: Some(dir.clone()),
            ..ExportConfig::default()
        };
        let written = Arc::new(Notify::new());
        let backend = FakeBackend {
            behaviour,
            written: Arc::clone(&written),
        };
        let exporter = Arc::new(Exporter::with_backends(config, backend, FakeProbe));
        let ctx = MainContext::new();
        let delegate = Arc::new(RecordingDelegate::default());
        let session = EditorSession::new(
            media,
            Size::new(180.0, 320.0),
            2.0,
            exporter,
            delegate.clone(),
            ctx.handle(),
        );
        Self {
            dir: TempDir(dir),
            ctx,
            delegate,
            written,
            session,
        }
    }

    fn video(behaviour: Behaviour) -> Self {
        Self::new(Media::video("clip.mov"), behaviour)
    }

    fn files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.dir.0)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

async fn wait_terminal(mut states: watch::Receiver<ExportState>) {
    // Closes once the export task has finished, which also ends the wait.
    let _ = states.wait_for(|s| s.is_terminal()).await;
}

async fn wait_idle<B, P>(session: &EditorSession<B, P>)
where
    B: RenderBackend + 'static,
    P: MediaProbe + 'static,
{
    while session.is_exporting() {
        tokio::task::yield_now().await;
    }
}

fn counting_callback(
    hits: &Arc<AtomicUsize>,
    last: &Arc<Mutex<Option<ExportResult<PathBuf>>>>,
) -> impl FnOnce(ExportResult<PathBuf>) + Send + 'static {
    let hits = Arc::clone(hits);
    let last = Arc::clone(last);
    move |result| {
        hits.fetch_add(1, Ordering::SeqCst);
        *last.lock().unwrap() = Some(result);
    }
}

#[tokio::test]
async fn completion_runs_once_on_the_main_context() {
    let mut fx = Fixture::video(Behaviour::Succeed);
    let hits = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));

    fx.session
        .start_export(counting_callback(&hits, &last))
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    fx.ctx.run_next().await;
    fx.ctx.run_until_idle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let path = last.lock().unwrap().take().unwrap().unwrap();
    assert!(path.is_file());
    assert!(!fx.session.is_exporting());
}

#[tokio::test]
async fn second_export_while_busy_is_refused() {
    let mut fx = Fixture::video(Behaviour::WaitForCancel);

    let states = fx.session.start_export(|_| {}).unwrap();
    assert!(fx.session.is_exporting());
    assert!(matches!(
        fx.session.start_export(|_| {}),
        Err(ExportError::Busy)
    ));

    fx.session.cancel_export();
    wait_terminal(states).await;
    wait_idle(&fx.session).await;
}

#[tokio::test]
async fn cancelled_export_holds_the_slot_until_it_stops() {
    let mut fx = Fixture::video(Behaviour::WaitForCancel);

    let states = fx.session.start_export(|_| {}).unwrap();
    fx.written.notified().await;
    fx.session.cancel_export();

    assert!(fx.session.is_exporting());
    assert!(matches!(
        fx.session.start_export(|_| {}),
        Err(ExportError::Busy)
    ));

    wait_terminal(states).await;
    wait_idle(&fx.session).await;
    let states = fx.session.start_export(|_| {}).unwrap();
    fx.written.notified().await;
    fx.session.cancel_export();
    wait_terminal(states).await;
    wait_idle(&fx.session).await;
}

#[tokio::test]
async fn cancelled_export_never_calls_back_and_leaves_no_file() {
    let mut fx = Fixture::video(Behaviour::WaitForCancel);
    let hits = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));

    let states = fx
        .session
        .start_export(counting_callback(&hits, &last))
        .unwrap();
    fx.written.notified().await;
    assert_eq!(fx.files().len(), 1);

    fx.session.cancel();
    wait_terminal(states).await;
    fx.ctx.run_until_idle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(fx.delegate.take(), vec![Event::Cancelled]);
    assert!(fx.files().is_empty());
}

#[tokio::test]
async fn failed_export_reports_the_error() {
    let mut fx = Fixture::video(Behaviour::Fail);
    let hits = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));

    fx.session
        .start_export(counting_callback(&hits, &last))
        .unwrap();
    fx.ctx.run_next().await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let result = last.lock().unwrap().take().unwrap();
    assert!(matches!(result, Err(ExportError::RenderFailed(_))));
    assert!(fx.files().is_empty());
}

#[tokio::test]
async fn finishing_a_video_delivers_the_location() {
    let mut fx = Fixture::video(Behaviour::Succeed);

    let states = fx.session.finish().unwrap();
    assert!(states.is_some());
    fx.ctx.run_next().await;

    let events = fx.delegate.take();
    assert_eq!(events.len(), 1);
    let Event::DoneVideo(path) = &events[0] else {
        panic!("unexpected event {events:?}");
    };
    assert!(path.is_file());
}

#[tokio::test]
async fn finishing_a_photo_flattens_immediately() {
    let photo = RgbaImage::from_pixel(8, 6, image::Rgba([0, 0, 255, 255]));
    let mut fx = Fixture::new(Media::Photo(photo), Behaviour::Succeed);

    assert!(fx.session.finish().unwrap().is_none());
    assert_eq!(fx.delegate.take(), vec![Event::Done(8, 6)]);
}

#[tokio::test]
async fn photo_sessions_cannot_start_a_video_export() {
    let photo = RgbaImage::new(2, 2);
    let mut fx = Fixture::new(Media::Photo(photo), Behaviour::Succeed);

    assert!(matches!(
        fx.session.start_export(|_| {}),
        Err(ExportError::Validation(_))
    ));
    assert!(!fx.session.is_exporting());
}

#[tokio::test]
async fn dropping_the_session_cancels_the_export() {
    let fx = Fixture::video(Behaviour::WaitForCancel);
    let Fixture {
        dir,
        mut ctx,
        delegate,
        written,
        mut session,
    } = fx;
    let hits = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));

    let states = session
        .start_export(counting_callback(&hits, &last))
        .unwrap();
    written.notified().await;
    drop(session);
    wait_terminal(states).await;
    ctx.run_until_idle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(delegate.take().is_empty());
    assert_eq!(std::fs::read_dir(&dir.0).unwrap().count(), 0);
}

#[tokio::test]
async fn trim_label_follows_the_selection() {
    let mut fx = Fixture::video(Behaviour::Succeed);
    assert_eq!(fx.session.trim_label(), None);

    fx.session
        .set_trim(TrimRange::from_secs(2.0, 5.0).unwrap());
    fx.session.set_audio_muted(true);

    assert_eq!(fx.session.trim_label().as_deref(), Some("3 sec"));
    assert!(fx.session.is_audio_muted());
}

#[derive(Default)]
struct StubPlayer {
    playing: Mutex<bool>,
    seeks: Mutex<Vec<f64>>,
}

impl PreviewPlayer for StubPlayer {
    fn current_time(&self) -> MediaTime {
        MediaTime::ZERO
    }

    fn duration(&self) -> MediaTime {
        MediaTime::new(10, 1).unwrap()
    }

    fn seek(&self, to: MediaTime) {
        self.seeks.lock().unwrap().push(to.as_secs_f64());
    }

    fn play(&self) {
        *self.playing.lock().unwrap() = true;
    }

    fn pause(&self) {
        *self.playing.lock().unwrap() = false;
    }
}

#[tokio::test(start_paused = true)]
async fn preview_follows_visibility() {
    let mut fx = Fixture::video(Behaviour::Succeed);
    let player = Arc::new(StubPlayer::default());

    fx.session.appear(player.clone()).unwrap();
    assert!(fx.session.is_previewing());
    assert!(*player.playing.lock().unwrap());
    assert_eq!(*player.seeks.lock().unwrap(), vec![0.0]);

    fx.session
        .set_trim(TrimRange::from_secs(2.0, 5.0).unwrap());
    assert_eq!(*player.seeks.lock().unwrap(), vec![0.0, 2.0]);

    fx.session.disappear();
    assert!(!fx.session.is_previewing());
    assert!(!*player.playing.lock().unwrap());
}
