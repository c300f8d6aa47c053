//! Dirt Render — offline WAV processor for the Dirtbox distortion engine.
//!
//! Reads a WAV file (or generates a test sine), runs it block by block
//! through the full signal path, and writes a 24-bit WAV. Useful for
//! auditioning model/drive/filter settings without loading a host.

use dirtbox_dsp::engine::Engine;
use dirtbox_dsp::params::SharedParams;
use dirtbox_dsp::shaper::Shaper;
use std::sync::Arc;

const BLOCK_SIZE: usize = 512;
const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

struct Options {
    input: Option<String>,
    output: String,
    shaper: Shaper,
    drive_db: f64,
    mix: f64,
    oversample: bool,
    pre_hpf_hz: Option<f64>,
    post_lpf_hz: Option<f64>,
    invert: bool,
    sine_hz: Option<f64>,
    amplitude: f64,
    duration: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input: None,
            output: String::from("dirt_out.wav"),
            shaper: Shaper::Soft,
            drive_db: 12.0,
            mix: 1.0,
            oversample: false,
            pre_hpf_hz: None,
            post_lpf_hz: None,
            invert: false,
            sine_hz: None,
            amplitude: 0.5,
            duration: 2.0,
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                i += 1;
                opts.input = Some(args[i].clone());
            }
            "--output" | "-o" => {
                i += 1;
                opts.output = args[i].clone();
            }
            "--model" | "-m" => {
                i += 1;
                opts.shaper = parse_model(&args[i]);
            }
            "--drive" | "-d" => {
                i += 1;
                opts.drive_db = args[i].parse().expect("invalid drive dB");
            }
            "--mix" => {
                i += 1;
                opts.mix = args[i].parse().expect("invalid mix");
            }
            "--oversample" | "-x" => {
                opts.oversample = true;
            }
            "--pre-hpf" => {
                i += 1;
                opts.pre_hpf_hz = Some(args[i].parse().expect("invalid pre HPF cutoff"));
            }
            "--post-lpf" => {
                i += 1;
                opts.post_lpf_hz = Some(args[i].parse().expect("invalid post LPF cutoff"));
            }
            "--invert" => {
                opts.invert = true;
            }
            "--sine" => {
                i += 1;
                opts.sine_hz = Some(args[i].parse().expect("invalid sine frequency"));
            }
            "--amplitude" | "-a" => {
                i += 1;
                opts.amplitude = args[i].parse().expect("invalid amplitude");
            }
            "--duration" => {
                i += 1;
                opts.duration = args[i].parse().expect("invalid duration");
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let (mut channels, sample_rate) = match (&opts.input, opts.sine_hz) {
        (Some(path), _) => read_wav(path),
        (None, Some(freq)) => {
            let n = (DEFAULT_SAMPLE_RATE * opts.duration) as usize;
            let tone: Vec<f64> = (0..n)
                .map(|i| {
                    let t = i as f64 / DEFAULT_SAMPLE_RATE;
                    opts.amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()
                })
                .collect();
            (vec![tone], DEFAULT_SAMPLE_RATE)
        }
        (None, None) => {
            eprintln!("Either --input FILE or --sine FREQ is required");
            print_usage();
            std::process::exit(1);
        }
    };

    let params = Arc::new(SharedParams::new());
    params.set_shaper(opts.shaper);
    params.set_drive_db(opts.drive_db);
    params.set_mix(opts.mix);
    params.set_oversample(opts.oversample);
    params.set_phase_invert(opts.invert);
    if let Some(hz) = opts.pre_hpf_hz {
        params.set_pre_filter(true);
        params.set_pre_cutoff_hz(hz);
    }
    if let Some(hz) = opts.post_lpf_hz {
        params.set_post_filter(true);
        params.set_post_cutoff_hz(hz);
    }

    let mut engine = Engine::new(params);
    engine.prepare(sample_rate, BLOCK_SIZE, channels.len());

    let total = channels[0].len();
    let mut pos = 0;
    while pos < total {
        let len = BLOCK_SIZE.min(total - pos);
        let mut block: Vec<&mut [f64]> = channels
            .iter_mut()
            .map(|c| &mut c[pos..pos + len])
            .collect();
        engine.process_block(&mut block);
        pos += len;
    }

    let peak = channels
        .iter()
        .flat_map(|c| c.iter())
        .map(|x| x.abs())
        .fold(0.0f64, f64::max);
    let peak_dbfs = if peak > 0.0 { 20.0 * peak.log10() } else { -120.0 };
    eprintln!(
        "Processed {total} frames x {} ch ({:?}, {:+.1} dB drive, mix {:.2}{})",
        channels.len(),
        opts.shaper,
        opts.drive_db,
        opts.mix,
        if opts.oversample { ", 2x" } else { "" }
    );
    eprintln!("  Peak: {peak:.6} ({peak_dbfs:.1} dBFS)");

    write_wav(&opts.output, &channels, sample_rate as u32);
    eprintln!("  Written: {}", opts.output);
}

fn parse_model(name: &str) -> Shaper {
    match name.to_ascii_lowercase().as_str() {
        "soft" => Shaper::Soft,
        "hard" => Shaper::Hard,
        "tube" => Shaper::Tube,
        "half" | "halfwave" => Shaper::HalfWave,
        "full" | "fullwave" => Shaper::FullWave,
        "sine" | "fold" => Shaper::SineFold,
        other => {
            eprintln!("Unknown model: {other} (soft|hard|tube|half|full|sine)");
            std::process::exit(1);
        }
    }
}

/// Read a WAV into per-channel f64 buffers in [-1, 1].
fn read_wav(path: &str) -> (Vec<Vec<f64>>, f64) {
    let mut reader = hound::WavReader::open(path).expect("failed to open input WAV");
    let spec = reader.spec();
    let num_channels = spec.channels as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.expect("bad sample") as f64)
            .collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.expect("bad sample") as f64 / scale)
                .collect()
        }
    };

    let frames = interleaved.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(frames); num_channels];
    for (i, &s) in interleaved.iter().enumerate() {
        channels[i % num_channels].push(s);
    }
    (channels, spec.sample_rate as f64)
}

/// Write 24-bit WAV, clamping to full scale.
fn write_wav(path: &str, channels: &[Vec<f64>], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("failed to create WAV file");
    let scale = (1 << 23) as f64 - 1.0;
    let frames = channels[0].len();
    for i in 0..frames {
        for channel in channels {
            let clamped = channel[i].clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * scale) as i32)
                .expect("failed to write sample");
        }
    }
    writer.finalize().expect("failed to finalize WAV");
}

fn print_usage() {
    eprintln!(
        r#"Dirt Render — offline WAV processor for the Dirtbox distortion engine

USAGE:
    dirt-render (--input FILE | --sine FREQ) [OPTIONS]

OPTIONS:
    -i, --input <FILE>        Input WAV to process
        --sine <FREQ>         Generate a test sine instead of reading a file
    -a, --amplitude <A>       Test sine amplitude (default: 0.5)
        --duration <SECS>     Test sine length in seconds (default: 2.0)
    -o, --output <FILE>       Output WAV (default: dirt_out.wav)
    -m, --model <NAME>        soft|hard|tube|half|full|sine (default: soft)
    -d, --drive <DB>          Drive in dB, -24..24 (default: 12)
        --mix <M>             Dry/wet mix 0..1 (default: 1.0)
    -x, --oversample          Run the nonlinearity at 2x internally
        --pre-hpf <HZ>        Enable the pre-distortion high-pass at HZ
        --post-lpf <HZ>       Enable the post-distortion low-pass at HZ
        --invert              Invert polarity of the final signal
    -h, --help                Print this help

EXAMPLES:
    dirt-render -i guitar.wav -o out.wav -m tube -d 18 --post-lpf 6000
    dirt-render --sine 1000 -a 0.1 -d 24 -m hard -x -o clipped.wav"#
    );
}
