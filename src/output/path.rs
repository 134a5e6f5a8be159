use std::path::{Path, PathBuf};

use crate::scene::config::{OutputFormat, RenderConfig};

/// Expand an output path template for `frame`.
///
/// The last run of `#` in the file name becomes the zero-padded frame number (padded to the
/// run length). Without `#` the 4-digit frame is appended. With `use_extension` the format's
/// extension is added unless already present. Relative templates resolve against `base_dir`.
pub fn frame_path(
    template: &str,
    base_dir: &Path,
    frame: i32,
    format: OutputFormat,
    use_extension: bool,
) -> PathBuf {
    let mut name = expand_frame(template, frame);
    if use_extension {
        let ext = format.extension();
        if !name.to_ascii_lowercase().ends_with(ext) {
            name.push_str(ext);
        }
    }
    resolve(base_dir, name)
}

fn resolve(base_dir: &Path, name: String) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn expand_frame(template: &str, frame: i32) -> String {
    let Some((start, end)) = frame_run(template) else {
        return format!("{template}{frame:04}");
    };
    let width = end - start;
    let digits = if frame < 0 {
        format!("-{:0width$}", frame.unsigned_abs(), width = width.saturating_sub(1))
    } else {
        format!("{frame:0width$}")
    };
    format!("{}{}{}", &template[..start], digits, &template[end..])
}

/// Byte range of the last `#` run in the file-name part of `template`.
fn frame_run(template: &str) -> Option<(usize, usize)> {
    let file_start = template.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    let end = template[file_start..].rfind('#').map(|i| file_start + i + 1)?;
    let run = template[..end].bytes().rev().take_while(|b| *b == b'#').count();
    let start = end - run;
    Some((start, end))
}

/// Insert a view suffix before the file extension: `shot_0001.png` + `_L` is
/// `shot_0001_L.png`.
pub fn view_path(path: &Path, suffix: &str) -> PathBuf {
    if suffix.is_empty() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

/// Every file written for one frame: one path, or one per view for individual multi-view
/// output.
pub fn output_paths(config: &RenderConfig, base_dir: &Path, frame: i32) -> Vec<PathBuf> {
    let out = &config.output;
    let path = frame_path(&out.path, base_dir, frame, out.format, out.use_extension);
    if !config.is_multiview_name() {
        return vec![path];
    }
    (0..config.num_views())
        .map(|view| view_path(&path, config.view_suffix(view)))
        .collect()
}

/// Movie file of one video stream: the template with its frame run (or its end) replaced by
/// the `start-end` frame range.
pub fn movie_path(config: &RenderConfig, base_dir: &Path, video: usize) -> PathBuf {
    let out = &config.output;
    let range = format!("{:04}-{:04}", config.frames.start, config.frames.end);
    let name = match frame_run(&out.path) {
        Some((start, end)) => format!("{}{range}{}", &out.path[..start], &out.path[end..]),
        None => format!("{}{range}", out.path),
    };
    let path = resolve(base_dir, format!("{name}{}", out.format.extension()));
    if config.is_multiview_name() {
        view_path(&path, config.view_suffix(video))
    } else {
        path
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/path.rs"]
mod tests;
