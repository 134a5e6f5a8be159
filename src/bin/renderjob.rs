use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use renderjob::scene::config::ThreadMode;
use renderjob::{
    AnimRequest, FrameRequest, JobCallbacks, Pipeline, Rect, RenderJob, RenderRegistry, SceneId,
    SceneStore,
};

#[derive(Parser, Debug)]
#[command(name = "renderjob", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one frame and write it to the scene's output path.
    Frame(FrameArgs),
    /// Render a frame range to images or a movie (movies require `ffmpeg` on PATH).
    Anim(AnimArgs),
}

#[derive(Args, Debug)]
struct SceneArgs {
    /// Scene file (JSON). Relative output paths resolve against its directory.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Scene to render; the first scene in the file by default.
    #[arg(long)]
    scene: Option<String>,

    /// Output path template overriding the scene's (`#` runs become the frame number).
    #[arg(long)]
    out: Option<String>,

    /// Worker threads for the backend.
    #[arg(long)]
    threads: Option<usize>,

    /// Render only this normalized border, as `xmin,ymin,xmax,ymax`.
    #[arg(long, value_parser = parse_border)]
    border: Option<Rect>,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Frame number; the scene's current frame by default.
    #[arg(long)]
    frame: Option<i32>,
}

#[derive(Args, Debug)]
struct AnimArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// First frame; the scene's range start by default.
    #[arg(long)]
    start: Option<i32>,

    /// Last frame, inclusive; the scene's range end by default.
    #[arg(long)]
    end: Option<i32>,

    /// Frame step; the scene's step by default.
    #[arg(long)]
    step: Option<i32>,
}

fn parse_border(s: &str) -> Result<Rect, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("'{v}': {e}")))
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        [x0, y0, x1, y1] => Ok(Rect::new(*x0, *y0, *x1, *y1)),
        _ => Err(format!("expected 4 comma-separated values, got {}", values.len())),
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Anim(args) => cmd_anim(args),
    }
}

/// Load the scene file and apply the command-line overrides to the selected scene.
fn load(args: &SceneArgs) -> anyhow::Result<(SceneStore, SceneId)> {
    let store = SceneStore::load(&args.in_path)
        .with_context(|| format!("load scenes from '{}'", args.in_path.display()))?;
    let id = match &args.scene {
        Some(name) => SceneId::local(name.as_str()),
        None => store
            .ids()
            .first()
            .cloned()
            .context("scene file contains no scenes")?,
    };
    let shared = store.require(&id)?;
    {
        let mut scene = shared.write();
        if let Some(out) = &args.out {
            scene.render.output.path = out.clone();
        }
        if let Some(threads) = args.threads {
            scene.render.threads = ThreadMode::Fixed(threads);
        }
        if let Some(border) = args.border {
            scene.render.use_border = true;
            scene.render.border = border;
        }
    }
    Ok((store, id))
}

fn setup(id: &SceneId) -> (Pipeline, Arc<RenderJob>) {
    let pipeline = Pipeline::with_defaults(Arc::new(RenderRegistry::init_process()));
    let job = pipeline.registry().new_scene_job(id);
    job.set_callbacks(JobCallbacks::background());
    (pipeline, job)
}

fn finish(job: &RenderJob) -> anyhow::Result<()> {
    let errors = job.reports().errors();
    if !errors.is_empty() {
        anyhow::bail!("render reported errors: {}", errors.join("; "));
    }
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let (store, id) = load(&args.scene)?;
    let frame = match args.frame {
        Some(frame) => frame,
        None => store.require(&id)?.read().frame.current,
    };
    let (pipeline, job) = setup(&id);

    let phase = pipeline
        .render_frame(
            &store,
            &job,
            &id,
            &FrameRequest::new(frame).with_write_still(true),
        )
        .with_context(|| format!("render frame {frame} of scene \"{id}\""))?;
    eprintln!("rendered frame {frame} ({phase:?})");
    finish(&job)?;
    pipeline.registry().free_all();
    Ok(())
}

fn cmd_anim(args: AnimArgs) -> anyhow::Result<()> {
    let (store, id) = load(&args.scene)?;
    let frames = store.require(&id)?.read().render.frames;
    let (pipeline, job) = setup(&id);

    let mut req = AnimRequest::from_frames(frames);
    if let Some(start) = args.start {
        req.first = start;
    }
    if let Some(end) = args.end {
        req.last = end;
    }
    if let Some(step) = args.step {
        req.step = step;
    }

    let stats = pipeline
        .render_anim(&store, &job, &id, &req)
        .with_context(|| format!("render frames {}..={} of scene \"{id}\"", req.first, req.last))?;
    eprintln!(
        "rendered {} frame(s), wrote {}, skipped {}{}",
        stats.rendered,
        stats.written,
        stats.skipped,
        if stats.cancelled { ", cancelled" } else { "" }
    );
    finish(&job)?;
    pipeline.registry().free_all();
    Ok(())
}
