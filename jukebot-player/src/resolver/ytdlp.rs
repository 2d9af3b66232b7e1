//! yt-dlp backed resolver
//!
//! Runs the `yt-dlp` executable as a child process. Inspection uses
//! `--dump-single-json --flat-playlist`; fetching extracts audio into the
//! scratch directory and prints the final file path as JSON after the move.

use super::{Inspection, PlaylistEntry, TrackResolver, UNKNOWN_TITLE};
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::scratch::ScratchDir;
use crate::track::{ResolvedTrack, TrackId};
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Output of `--dump-single-json --flat-playlist`
#[derive(Debug, Deserialize)]
struct InspectInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    url: Option<String>,
    title: Option<String>,
}

/// Line printed by `--print after_move:%(.{filepath,title,thumbnail})j`
#[derive(Debug, Deserialize)]
struct FetchInfo {
    filepath: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
}

pub struct YtDlpResolver {
    config: ResolverConfig,
}

impl YtDlpResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Arguments for a non-downloading inspection
    pub fn inspect_args(&self, reference: &str) -> Vec<OsString> {
        [
            "--dump-single-json",
            "--flat-playlist",
            "--no-warnings",
            "--default-search",
            "auto",
            "--playlist-items",
        ]
        .into_iter()
        .map(OsString::from)
        .chain([
            OsString::from(format!("1-{}", self.config.playlist_limit)),
            OsString::from("--"),
            OsString::from(reference),
        ])
        .collect()
    }

    /// Arguments for downloading and transcoding a single item
    pub fn fetch_args(&self, id: TrackId, reference: &str, dest: &ScratchDir) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-f",
            "bestaudio/best",
            "--no-playlist",
            "-x",
            "--audio-format",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(self.config.audio_format.clone().into());
        args.push("--audio-quality".into());
        args.push(self.config.audio_quality.clone().into());
        args.extend(
            [
                "--restrict-filenames",
                "--no-check-certificates",
                "--no-warnings",
                "--default-search",
                "auto",
                "--no-simulate",
                "--print",
                "after_move:%(.{filepath,title,thumbnail})j",
                "-o",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(dest.output_template(id).into_os_string());
        args.push("--".into());
        args.push(reference.into());
        args
    }

    fn command(&self, args: Vec<OsString>) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run the tool to completion, or kill it when `cancel` fires.
    /// Returns `None` on cancellation.
    async fn run(
        &self,
        args: Vec<OsString>,
        cancel: &CancellationToken,
    ) -> Result<Option<ProcessOutput>> {
        let mut child = self.command(args).spawn().map_err(|e| {
            Error::Unsupported(format!("Failed to launch {}: {}", self.config.program, e))
        })?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("child stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("child stderr not captured".to_string()))?;

        let finished = {
            let run = async {
                let mut out = String::new();
                let mut err = String::new();
                let (out_res, err_res, status) = tokio::join!(
                    stdout.read_to_string(&mut out),
                    stderr.read_to_string(&mut err),
                    child.wait()
                );
                out_res?;
                err_res?;
                Ok::<_, std::io::Error>(ProcessOutput {
                    status: status?,
                    stdout: out,
                    stderr: err,
                })
            };
            tokio::select! {
                output = run => Some(output),
                _ = cancel.cancelled() => None,
            }
        };

        match finished {
            Some(output) => Ok(Some(output?)),
            None => {
                if let Err(e) = child.kill().await {
                    debug!("yt-dlp already exited before kill: {}", e);
                }
                Ok(None)
            }
        }
    }
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl ProcessOutput {
    fn failure_message(&self) -> String {
        last_line(&self.stderr)
            .map(str::to_string)
            .unwrap_or_else(|| format!("yt-dlp exited with {}", self.status))
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn inspect(&self, reference: &str) -> Result<Inspection> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::Unsupported("Empty track reference".to_string()));
        }

        debug!(reference, "Inspecting reference");
        // Inspection is not cancellable on its own; the caller's task is
        let never = CancellationToken::new();
        let output = self
            .run(self.inspect_args(reference), &never)
            .await?
            .ok_or(Error::Cancelled)?;

        if !output.status.success() {
            return Err(Error::resolve(reference, output.failure_message()));
        }
        parse_inspection(&output.stdout).map_err(|e| Error::resolve(reference, e.to_string()))
    }

    async fn fetch(
        &self,
        id: TrackId,
        reference: &str,
        dest: &ScratchDir,
        cancel: CancellationToken,
    ) -> Result<ResolvedTrack> {
        dest.ensure().await?;
        info!(%id, reference, "Downloading track");

        let output = match self.run(self.fetch_args(id, reference, dest), &cancel).await {
            Ok(Some(output)) => output,
            Ok(None) => {
                let removed = dest.remove_by_id(id).await;
                debug!(%id, removed, "Download cancelled, partial files removed");
                return Err(Error::Cancelled);
            }
            Err(e) => {
                dest.remove_by_id(id).await;
                return Err(e);
            }
        };

        if !output.status.success() {
            dest.remove_by_id(id).await;
            let message = output.failure_message();
            warn!(%id, reference, "yt-dlp failed: {}", message);
            return Err(Error::resolve(reference, message));
        }

        let info = match parse_fetch_output(&output.stdout) {
            Ok(info) => info,
            Err(e) => {
                dest.remove_by_id(id).await;
                return Err(e);
            }
        };

        let path = match info.filepath.map(PathBuf::from) {
            Some(path) if path.exists() => path,
            _ => {
                // Fall back to the expected name if the print line was lost
                let expected = dest
                    .path()
                    .join(format!("{}.{}", id, self.config.audio_format));
                if !expected.exists() {
                    dest.remove_by_id(id).await;
                    return Err(Error::Unsupported(format!(
                        "No playable output for {}",
                        reference
                    )));
                }
                expected
            }
        };

        let title = info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        info!(%id, title = %title, path = %path.display(), "Track downloaded");
        Ok(ResolvedTrack::new(id, path, title, info.thumbnail))
    }
}

/// Interpret `--dump-single-json --flat-playlist` output
pub fn parse_inspection(json: &str) -> Result<Inspection> {
    let info: InspectInfo = serde_json::from_str(json.trim())?;

    if info.kind.as_deref() == Some("playlist") {
        let entries = info
            .entries
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let reference = entry.url.filter(|u| !u.is_empty())?;
                Some(PlaylistEntry {
                    reference,
                    title: entry.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
                })
            })
            .collect();
        return Ok(Inspection::Playlist { entries });
    }

    Ok(Inspection::Single {
        title: info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
    })
}

/// Pick the final JSON line printed after the audio was moved into place
fn parse_fetch_output(stdout: &str) -> Result<FetchInfo> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| Error::Unsupported("yt-dlp printed no file information".to_string()))?;
    Ok(serde_json::from_str(line)?)
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
