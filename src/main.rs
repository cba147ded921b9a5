//! Headless TN3270 client
//!
//! Connects, negotiates, and logs what the host sends. Useful for checking
//! how a host negotiates: run with `RUST_LOG=tn3270r=trace`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use log::{info, warn};

use tn3270r::config::default_config_path;
use tn3270r::lib3270::bind::ScreenGeometry;
use tn3270r::lib3270::record::Transmitter;
use tn3270r::{
    ConnectionMode, DataStreamResult, Diagnostic, HostSession, RustlsHandshake, SessionConfig,
    Tn3270Connection,
};

/// Logs everything it is handed
#[derive(Default)]
struct TraceHost {
    line: Vec<u8>,
}

impl HostSession for TraceHost {
    fn process_ds(&mut self, record: &[u8], _tx: &mut Transmitter) -> DataStreamResult {
        info!("3270 record, {} bytes: {}", record.len(), hex_preview(record));
        DataStreamResult::OkayNoOutput
    }

    fn write_sscp_lu(&mut self, record: &[u8], _tx: &mut Transmitter) {
        info!("SSCP-LU record, {} bytes: {}", record.len(), hex_preview(record));
    }

    fn ansi_process(&mut self, byte: u8) {
        if byte == b'\n' {
            println!("{}", String::from_utf8_lossy(&self.line).trim_end_matches('\r'));
            self.line.clear();
        } else {
            self.line.push(byte);
        }
    }

    fn mode_changed(&mut self, mode: ConnectionMode, bound: bool) {
        println!("Mode: {mode}{}", if bound { ", bound" } else { "" });
    }

    fn geometry_changed(&mut self, geometry: ScreenGeometry, valid: bool) {
        if valid {
            println!("Screen: {geometry}");
        } else {
            println!("Screen size from BIND refused, keeping {geometry}");
        }
    }

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        warn!("{diagnostic}");
    }
}

fn hex_preview(data: &[u8]) -> String {
    let mut out: Vec<String> = data.iter().take(32).map(|b| format!("{b:02x}")).collect();
    if data.len() > 32 {
        out.push("...".to_string());
    }
    out.join(" ")
}

fn print_help() {
    println!("tn3270r - TN3270/TN3270E client");
    println!();
    println!("Usage: tn3270r [OPTIONS] [L:]host[:port]");
    println!();
    println!("Options:");
    println!("  --config <path>       Load session settings from a JSON file");
    println!("  --save-config <path>  Write the effective settings and exit");
    println!("  --lu <names>          Comma-separated LU names to try");
    println!("  --model <2-5>         Terminal model (default: 4)");
    println!("  --no-tn3270e          Negotiate plain TN3270 only");
    println!("  --insecure            Do not verify the TLS server certificate");
    println!("  --ca-bundle <path>    Extra trusted CAs (PEM)");
    println!("  --duration <secs>     Stay connected this long (default: 30)");
    println!("  --help, -h            Show this help message");
    println!();
    println!("Without a config file, {} is used when it exists.", default_config_path().display());
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut save_path: Option<PathBuf> = None;
    let mut target: Option<String> = None;
    let mut lu_names: Option<String> = None;
    let mut model: Option<u8> = None;
    let mut no_tn3270e = false;
    let mut insecure = false;
    let mut ca_bundle: Option<PathBuf> = None;
    let mut duration = Duration::from_secs(30);

    let mut i = 1;
    while i < args.len() {
        let value = |i: usize| -> anyhow::Result<String> {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{} requires a value", args[i]))
        };
        match args[i].as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--save-config" => {
                save_path = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--lu" => {
                lu_names = Some(value(i)?);
                i += 1;
            }
            "--model" => {
                model = Some(value(i)?.parse().context("--model requires a number")?);
                i += 1;
            }
            "--ca-bundle" => {
                ca_bundle = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--duration" => {
                duration = Duration::from_secs(value(i)?.parse().context("--duration requires seconds")?);
                i += 1;
            }
            "--no-tn3270e" => no_tn3270e = true,
            "--insecure" => insecure = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if arg.starts_with('-') => bail!("unknown option {arg}"),
            arg => target = Some(arg.to_string()),
        }
        i += 1;
    }

    let mut config = match (&config_path, &target) {
        (Some(path), _) => SessionConfig::load(path)?,
        (None, Some(target)) => SessionConfig::from_target(target)?,
        (None, None) => {
            let path = default_config_path();
            if !path.exists() {
                print_help();
                bail!("no host given");
            }
            SessionConfig::load(&path)?
        }
    };
    if let (Some(_), Some(target)) = (&config_path, &target) {
        let from_target = SessionConfig::from_target(target)?;
        config.host = from_target.host;
        config.port = from_target.port;
        config.tls = from_target.tls;
    }
    if lu_names.is_some() {
        config.lu_names = lu_names;
    }
    if let Some(model) = model {
        config.terminal_model = model;
    }
    if no_tn3270e {
        config.tn3270e = false;
    }
    if insecure {
        config.tls_verify = false;
    }
    if ca_bundle.is_some() {
        config.tls_ca_bundle = ca_bundle;
    }
    config.validate()?;

    if let Some(path) = save_path {
        config.save(&path)?;
        println!("Saved session settings to {}", path.display());
        return Ok(());
    }

    let tls = RustlsHandshake::from_config(&config)?;
    let mut conn = Tn3270Connection::with_tls(config, TraceHost::default(), Box::new(tls));
    conn.connect()
        .with_context(|| format!("connecting to {}:{}", conn.config().host, conn.config().port))?;

    let started = Instant::now();
    conn.run_until(duration, |_, _| false)?;

    let stats = conn.session().stats();
    println!(
        "{} after {:.1}s: {} bytes / {} records in, {} bytes / {} records out",
        conn.state(),
        started.elapsed().as_secs_f64(),
        stats.bytes_received,
        stats.records_received,
        stats.bytes_sent,
        stats.records_sent
    );
    conn.disconnect();
    Ok(())
}
