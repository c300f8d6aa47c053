//! Alias Bench — Dirtbox DSP validation CLI.
//!
//! Measures what the signal path actually does to a test tone: harmonic
//! content per model, aliased energy with oversampling on vs off, and the
//! static transfer curves.
//!
//! Usage:
//!   alias-bench harmonics [--freq F] [--amplitude A] [--drive DB] [--model M]
//!   alias-bench alias [--freq F] [--amplitude A] [--drive DB] [--model M]
//!   alias-bench curve [--model M] [--points N] [--csv FILE]

use dirtbox_dsp::engine::Engine;
use dirtbox_dsp::params::{ParamSnapshot, SharedParams};
use dirtbox_dsp::shaper::Shaper;
use std::f64::consts::PI;
use std::sync::Arc;

const SAMPLE_RATE: f64 = 44_100.0;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "harmonics" => cmd_harmonics(&args[2..]),
        "alias" => cmd_alias(&args[2..]),
        "curve" => cmd_curve(&args[2..]),
        _ => {
            eprintln!("Unknown subcommand: {}", args[1]);
            print_usage();
        }
    }
}

fn print_usage() {
    eprintln!("Alias Bench — Dirtbox DSP validation");
    eprintln!();
    eprintln!("Subcommands:");
    eprintln!("  harmonics   Harmonic breakdown (H1-H5, THD) for one model");
    eprintln!("  alias       Aliased energy with oversampling off vs on");
    eprintln!("  curve       Static transfer curve dump (stdout or CSV)");
}

fn parse_flag(args: &[String], flag: &str, default: f64) -> f64 {
    for i in 0..args.len().saturating_sub(1) {
        if args[i] == flag {
            return args[i + 1].parse().unwrap_or(default);
        }
    }
    default
}

fn parse_flag_str<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    for i in 0..args.len().saturating_sub(1) {
        if args[i] == flag {
            return &args[i + 1];
        }
    }
    default
}

fn parse_model(args: &[String]) -> Shaper {
    match parse_flag_str(args, "--model", "soft") {
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

/// Run a mono sine through a freshly prepared engine and return the output.
fn render_tone(snapshot: ParamSnapshot, freq: f64, amplitude: f64, n: usize) -> Vec<f64> {
    let mut engine = Engine::new(Arc::new(SharedParams::from_snapshot(&snapshot)));
    engine.prepare(SAMPLE_RATE, n, 1);

    let mut buf: Vec<f64> = (0..n)
        .map(|i| amplitude * (2.0 * PI * freq * i as f64 / SAMPLE_RATE).sin())
        .collect();
    let mut block: Vec<&mut [f64]> = vec![&mut buf[..]];
    engine.process_block(&mut block);
    buf
}

// ─── Harmonic analysis ──────────────────────────────────────────────────────

fn cmd_harmonics(args: &[String]) {
    let freq = parse_flag(args, "--freq", 440.0);
    let amplitude = parse_flag(args, "--amplitude", 0.25);
    let drive_db = parse_flag(args, "--drive", 18.0);
    let model = parse_model(args);

    let snapshot = ParamSnapshot {
        shaper: model,
        drive_db,
        mix: 1.0,
        ..ParamSnapshot::default()
    };
    let n = (SAMPLE_RATE * 0.5) as usize;
    let output = render_tone(snapshot, freq, amplitude, n);

    // Analyze the last quarter (mix smoothing and filters settled).
    let signal = &output[n * 3 / 4..];
    let h1 = dft_magnitude(signal, freq, SAMPLE_RATE);
    let h2 = dft_magnitude(signal, 2.0 * freq, SAMPLE_RATE);
    let h3 = dft_magnitude(signal, 3.0 * freq, SAMPLE_RATE);
    let h4 = dft_magnitude(signal, 4.0 * freq, SAMPLE_RATE);
    let h5 = dft_magnitude(signal, 5.0 * freq, SAMPLE_RATE);

    let thd = ((h2 * h2 + h3 * h3 + h4 * h4 + h5 * h5).sqrt() / h1) * 100.0;

    println!("Harmonic analysis — {model:?}");
    println!("  Frequency:   {freq:.0} Hz");
    println!("  Amplitude:   {amplitude:.3}");
    println!("  Drive:       {drive_db:+.1} dB");
    println!();
    println!("  H1 (fund):   {h1:.6}");
    for (label, h) in [("H2", h2), ("H3", h3), ("H4", h4), ("H5", h5)] {
        let rel = if h1 > 0.0 { 20.0 * (h / h1).log10() } else { f64::NEG_INFINITY };
        println!("  {label}:          {h:.6}  ({rel:.1} dB rel)");
    }
    println!();
    println!("  THD:         {thd:.3}%");
}

// ─── Aliasing measurement ───────────────────────────────────────────────────

fn cmd_alias(args: &[String]) {
    let freq = parse_flag(args, "--freq", 15_000.0);
    let amplitude = parse_flag(args, "--amplitude", 0.9);
    let drive_db = parse_flag(args, "--drive", 24.0);
    let model = parse_model(args);

    // The 3rd harmonic of `freq` folds around Nyquist; that folded bin is
    // pure aliasing and the number this command exists to compare.
    let alias_hz = (3.0 * freq - SAMPLE_RATE).abs();
    if alias_hz < 20.0 || alias_hz > SAMPLE_RATE / 2.0 - 20.0 {
        eprintln!("--freq {freq} puts the folded 3rd harmonic out of band; pick 8-15 kHz");
        std::process::exit(1);
    }

    let base = ParamSnapshot {
        shaper: model,
        drive_db,
        mix: 1.0,
        ..ParamSnapshot::default()
    };
    let oversampled = ParamSnapshot {
        oversample: true,
        ..base
    };

    let n = 16_384;
    let direct = render_tone(base, freq, amplitude, n);
    let wide = render_tone(oversampled, freq, amplitude, n);

    let start = n / 4;
    let direct_alias = dft_magnitude(&direct[start..], alias_hz, SAMPLE_RATE);
    let os_alias = dft_magnitude(&wide[start..], alias_hz, SAMPLE_RATE);
    let direct_fund = dft_magnitude(&direct[start..], freq, SAMPLE_RATE);

    let improvement_db = 20.0 * (direct_alias / os_alias.max(1e-12)).log10();

    println!("Aliasing measurement — {model:?}");
    println!("  Test tone:       {freq:.0} Hz at {amplitude:.2}, drive {drive_db:+.1} dB");
    println!("  Folded H3 bin:   {alias_hz:.0} Hz");
    println!();
    println!("  Fundamental:     {direct_fund:.6}");
    println!(
        "  Alias (direct):  {direct_alias:.6}  ({:.1} dB rel fund)",
        20.0 * (direct_alias / direct_fund).log10()
    );
    println!(
        "  Alias (2x):      {os_alias:.6}  ({:.1} dB rel fund)",
        20.0 * (os_alias / direct_fund).log10()
    );
    println!();
    println!("  Oversampling gain: {improvement_db:.1} dB less aliased energy");
}

// ─── Transfer curve dump ────────────────────────────────────────────────────

fn cmd_curve(args: &[String]) {
    let points = parse_flag(args, "--points", 81.0) as usize;
    let model = parse_model(args);
    let csv_path = parse_flag_str(args, "--csv", "");

    let mut csv_lines = Vec::new();
    csv_lines.push("input,output".to_string());

    println!("Transfer curve — {model:?}");
    println!("{:>10}  {:>10}", "in", "out");
    println!("{:-<10}  {:-<10}", "", "");

    for i in 0..points {
        let frac = i as f64 / (points - 1).max(1) as f64;
        let x = -4.0 + 8.0 * frac;
        let y = model.shape(x);
        println!("{x:>10.4}  {y:>10.6}");
        csv_lines.push(format!("{x:.6},{y:.6}"));
    }

    if !csv_path.is_empty() {
        std::fs::write(csv_path, csv_lines.join("\n") + "\n").expect("Failed to write CSV");
        println!("\nCSV written to {csv_path}");
    }
}

// ─── DFT helper ─────────────────────────────────────────────────────────────

fn dft_magnitude(signal: &[f64], freq: f64, sr: f64) -> f64 {
    let n = signal.len() as f64;
    let mut re = 0.0;
    let mut im = 0.0;
    for (i, &s) in signal.iter().enumerate() {
        let phase = 2.0 * PI * freq * i as f64 / sr;
        re += s * phase.cos();
        im -= s * phase.sin();
    }
    2.0 * ((re / n).powi(2) + (im / n).powi(2)).sqrt()
}
