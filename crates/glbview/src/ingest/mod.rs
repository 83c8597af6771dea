//! Model ingestion for the viewer.
//!
//! Each load request runs on a worker thread: chunked read, container
//! validation, parse, bookkeeping. Progress and the final outcome come
//! back over channels and are applied on the main schedule, where the
//! previous model is disposed before the new one is installed.

use std::path::PathBuf;

use bevy::prelude::*;
use crossbeam_channel::{Receiver, TryRecvError};

use glbview_ingest::{
    glb, scene, ByteSource, CancelToken, ChunkedByteLoader, IngestError, Progress, ProgressPhase,
    ProgressTracker, SceneSummary,
};

use crate::backend::BackendConfig;

mod convert;
mod session;

pub use session::{LoadedModel, ModelIngestSession};

pub struct IngestPlugin;

impl Plugin for IngestPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ModelIngestSession>()
            .init_resource::<LoadProgress>()
            .init_resource::<ActiveIngest>()
            .add_event::<LoadModelRequest>()
            .add_event::<ModelLoadedEvent>()
            .add_systems(
                Update,
                (handle_load_requests, pump_progress, apply_completed_ingests).chain(),
            );
    }
}

/// Where a model comes from.
#[derive(Debug, Clone)]
pub enum ModelOrigin {
    File(PathBuf),
    Url(String),
}

impl ModelOrigin {
    pub fn label(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Url(url) => url.clone(),
        }
    }
}

/// Request to load a model, replacing whatever is currently displayed.
#[derive(Event, Debug, Clone)]
pub struct LoadModelRequest {
    pub origin: ModelOrigin,
}

/// Fired once a model is installed in the scene.
#[derive(Event, Debug, Clone, Copy)]
pub struct ModelLoadedEvent {
    pub summary: SceneSummary,
}

/// Progress and error state surfaced to the UI.
#[derive(Resource, Default)]
pub struct LoadProgress {
    pub active: bool,
    pub phase_label: &'static str,
    pub fraction: f32,
    pub error: Option<String>,
    pub out_of_memory: bool,
}

impl LoadProgress {
    fn start(&mut self) {
        *self = Self {
            active: true,
            phase_label: ProgressPhase::Read.label(),
            ..Default::default()
        };
    }

    fn fail(&mut self, error: &IngestError) {
        self.active = false;
        self.out_of_memory = error.is_out_of_memory();
        self.error = Some(error.to_string());
    }
}

/// Everything the worker hands back on success. Spawning happens on
/// the main schedule; the worker only parses and summarizes.
pub struct LoadedSceneData {
    pub document: gltf::Document,
    pub buffers: Vec<gltf::buffer::Data>,
    pub images: Vec<gltf::image::Data>,
    pub summary: SceneSummary,
    pub file_size_mb: f64,
    pub origin_label: String,
}

type IngestOutcome = Result<LoadedSceneData, IngestError>;

struct IngestWorker {
    progress_rx: Receiver<Progress>,
    result_rx: Receiver<IngestOutcome>,
    cancel: CancelToken,
}

/// At most one ingestion is in flight; a new request cancels the old
/// one at the loader's yield point before its own worker starts.
#[derive(Resource, Default)]
struct ActiveIngest(Option<IngestWorker>);

#[allow(clippy::too_many_arguments)]
fn handle_load_requests(
    mut commands: Commands,
    mut requests: EventReader<LoadModelRequest>,
    mut active: ResMut<ActiveIngest>,
    mut session: ResMut<ModelIngestSession>,
    mut progress: ResMut<LoadProgress>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut images: ResMut<Assets<Image>>,
    config: Res<BackendConfig>,
) {
    for request in requests.read() {
        if let Some(previous) = active.0.take() {
            warn!("Cancelling in-flight load before starting a new one");
            previous.cancel.cancel();
        }

        // Release the previous scene before any of the new payload is
        // read or parsed; this bounds peak memory when replacing one
        // large model with another.
        session.dispose_current(&mut commands, &mut meshes, &mut materials, &mut images);

        let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let cancel = CancelToken::new();

        let origin = request.origin.clone();
        let chunk_size = config.chunk_size;
        let worker_cancel = cancel.clone();
        std::thread::spawn(move || {
            let outcome = run_ingest(origin, chunk_size, progress_tx, &worker_cancel);
            let _ = result_tx.send(outcome);
        });

        progress.start();
        active.0 = Some(IngestWorker {
            progress_rx,
            result_rx,
            cancel,
        });
        info!(
            "Started ingest of {} ({} MiB chunks)",
            request.origin.label(),
            config.chunk_size / (1024 * 1024)
        );
    }
}

/// The worker-side pipeline: acquire source, chunked read, container
/// validation, parse, summary.
fn run_ingest(
    origin: ModelOrigin,
    chunk_size: usize,
    progress_tx: crossbeam_channel::Sender<Progress>,
    cancel: &CancelToken,
) -> IngestOutcome {
    let source = match &origin {
        ModelOrigin::File(path) => ByteSource::open(path)?,
        ModelOrigin::Url(url) => ByteSource::fetch(url)?,
    };

    let loader = ChunkedByteLoader::new(chunk_size)?;
    let mut tracker = ProgressTracker::new(ProgressPhase::Read, move |report| {
        let _ = progress_tx.send(report);
    });

    let buffer = loader.load(source, &mut tracker, cancel)?;
    let file_size_mb = buffer.len() as f64 / (1024.0 * 1024.0);

    if glb::is_glb(&buffer) {
        glb::validate(&buffer)?;
    }

    tracker.enter_phase(ProgressPhase::Parse);
    let (document, buffers, images) = scene::parse(&buffer)?;
    let summary = scene::summarize(&document);
    tracker.finish();

    Ok(LoadedSceneData {
        document,
        buffers,
        images,
        summary,
        file_size_mb,
        origin_label: origin.label(),
    })
}

fn pump_progress(active: Res<ActiveIngest>, mut progress: ResMut<LoadProgress>) {
    let Some(worker) = active.0.as_ref() else {
        return;
    };
    for report in worker.progress_rx.try_iter() {
        progress.active = true;
        progress.phase_label = report.phase.label();
        progress.fraction = report.fraction;
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_completed_ingests(
    mut commands: Commands,
    mut active: ResMut<ActiveIngest>,
    mut session: ResMut<ModelIngestSession>,
    mut progress: ResMut<LoadProgress>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut images: ResMut<Assets<Image>>,
    mut loaded_events: EventWriter<ModelLoadedEvent>,
) {
    let outcome = match active.0.as_ref() {
        Some(worker) => worker.result_rx.try_recv(),
        None => return,
    };

    match outcome {
        Ok(Ok(data)) => {
            active.0 = None;

            // Normally a no-op: the request handler already disposed
            // the previous scene. Kept so the slot can never hold two
            // models at once.
            session.dispose_current(&mut commands, &mut meshes, &mut materials, &mut images);

            let model =
                convert::spawn_model(&mut commands, &data, &mut meshes, &mut materials, &mut images);
            let summary = model.summary;
            session.install(model);

            *progress = LoadProgress::default();
            loaded_events.write(ModelLoadedEvent { summary });
        }
        Ok(Err(error)) => {
            active.0 = None;
            error!("Ingest failed: {error}");
            progress.fail(&error);
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Disconnected) => {
            active.0 = None;
            progress.active = false;
        }
    }
}
