use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser as _;
use mp4stream::{Codec, Frame, Mp4Reader, Mp4Writer, ReadEvent, ReaderConfig, WriterConfig};

#[derive(clap::Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print every box and frame of an MP4 or fragmented MP4 file.
    Dump {
        /// Feed the reader this many bytes at a time.
        #[clap(long, default_value_t = 64 * 1024)]
        chunk_size: usize,

        /// Skip tracks with unsupported codecs instead of failing.
        #[clap(long)]
        skip_unsupported: bool,

        /// Print boxes only.
        #[clap(long)]
        atoms_only: bool,

        /// Path to the file to dump.
        file: PathBuf,
    },

    /// Rewrite an MP4 file as fragmented MP4.
    Fragment {
        /// The shortest fragment duration, in milliseconds.
        #[clap(long, default_value_t = 1000)]
        fragment_duration_ms: u32,

        /// Keep H.264 and H.265 samples in decode order, with composition time offsets.
        #[clap(long)]
        enable_dts: bool,

        /// Skip tracks with unsupported codecs instead of failing.
        #[clap(long)]
        skip_unsupported: bool,

        /// Path to the input file.
        input: PathBuf,

        /// Path to write the fragmented file to.
        output: PathBuf,
    },
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()
        .context("Error initializing logging")?;

    let args = Args::try_parse().context("Error parsing command line arguments")?;

    match args.command {
        Command::Dump { chunk_size, skip_unsupported, atoms_only, file } => {
            let config = ReaderConfig::builder().skip_unsupported_tracks(skip_unsupported).build();
            dump(file, chunk_size.max(1), config, atoms_only)
        }
        Command::Fragment { fragment_duration_ms, enable_dts, skip_unsupported, input, output } => {
            let reader_config = ReaderConfig::builder().skip_unsupported_tracks(skip_unsupported).build();
            let writer_config =
                WriterConfig::builder().fragment_duration_ms(fragment_duration_ms).enable_dts(enable_dts).build();
            fragment(input, output, reader_config, writer_config)
        }
    }
}

/// Push `file` through a reader in `chunk_size` pieces, calling `on_event` for everything it reports.
fn read_file(
    file: PathBuf,
    chunk_size: usize,
    config: ReaderConfig,
    mut on_event: impl FnMut(ReadEvent<'_>),
) -> Result<(), anyhow::Error> {
    let mut file = File::open(file).context("Error opening file")?;
    let mut reader = Mp4Reader::with_config(config);
    let mut buf = vec![0; chunk_size];
    loop {
        let len = file.read(&mut buf).context("Error reading file")?;
        if len == 0 {
            break;
        }
        reader
            .read(&buf[..len], |event| {
                on_event(event);
                true
            })
            .map_err(|err| anyhow::anyhow!("{err:?}"))
            .with_context(|| format!("Error parsing mp4 file at offset {}", reader.position()))?;
    }
    reader.finish().map_err(|err| anyhow::anyhow!("{err:?}")).context("Error parsing mp4 file")
}

fn dump(file: PathBuf, chunk_size: usize, config: ReaderConfig, atoms_only: bool) -> Result<(), anyhow::Error> {
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_result = Ok(());
    read_file(file, chunk_size, config, |event| {
        let line = match event {
            ReadEvent::Atom(atom) if atom.is_complete() => {
                format!("{:>10} {} {} bytes", atom.position(), atom.box_type(), atom.box_size())
            }
            ReadEvent::Atom(_) => return,
            ReadEvent::Frame(_) if atoms_only => return,
            ReadEvent::Frame(frame) => format!(
                "{:>10} track {} {} {:?} pts {} dts {} duration {} /{} {} bytes",
                "",
                frame.track_id,
                frame.codec,
                frame.kind,
                frame.pts,
                frame.dts,
                frame.duration,
                frame.timebase,
                frame.data.len(),
            ),
        };
        if write_result.is_ok() {
            write_result = writeln!(out, "{line}");
        }
    })?;
    write_result.context("Error writing to stdout")?;
    out.flush().context("Error writing to stdout")
}

fn fragment(
    input: PathBuf,
    output: PathBuf,
    reader_config: ReaderConfig,
    writer_config: WriterConfig,
) -> Result<(), anyhow::Error> {
    let mut frames: Vec<Frame> = Vec::new();
    read_file(input, 64 * 1024, reader_config, |event| {
        if let ReadEvent::Frame(frame) = event {
            frames.push(frame);
        }
    })?;

    // The writer tells tracks apart by codec, so only the first track of each codec is kept.
    let mut tracks: Vec<(u32, Codec)> = Vec::new();
    let mut dropped: Vec<u32> = Vec::new();
    for frame in &frames {
        if tracks.iter().any(|&(track_id, _)| track_id == frame.track_id) || dropped.contains(&frame.track_id) {
            continue;
        }
        if tracks.iter().any(|&(_, codec)| codec == frame.codec) {
            log::warn!("dropping track {}: a {} track is already being written", frame.track_id, frame.codec);
            dropped.push(frame.track_id);
        } else {
            tracks.push((frame.track_id, frame.codec));
        }
    }
    let codecs: Vec<Codec> = tracks.iter().map(|&(_, codec)| codec).collect();
    let mut writer = Mp4Writer::new(&codecs, writer_config)
        .map_err(|err| anyhow::anyhow!("{err:?}"))
        .context("Error creating writer")?;

    let mut output = BufWriter::new(File::create(output).context("Error creating output file")?);
    let mut write_result = Ok(());
    let mut on_segment = |segment: Bytes| {
        write_result = output.write_all(&segment);
        write_result.is_ok()
    };
    for frame in frames {
        if !tracks.contains(&(frame.track_id, frame.codec)) {
            continue;
        }
        writer.write(frame, &mut on_segment).map_err(|err| anyhow::anyhow!("{err:?}")).context("Error writing frame")?;
    }
    writer.finish(&mut on_segment).map_err(|err| anyhow::anyhow!("{err:?}")).context("Error finishing output")?;
    write_result.context("Error writing output file")?;
    output.flush().context("Error writing output file")
}
