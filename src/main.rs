//! certforge – command-line certificate renderer.
//!
//! Usage:
//!   certforge render <certificate.json> <template.json> [output.pdf]
//!             [--qr <image>] [--html <out.html>] [--assets <dir>]...
//!   certforge new-id
//!
//! If `output.pdf` is omitted the PDF is written next to the certificate file
//! as `Certificate-<id>.pdf`.

use std::{env, fs, path::Path, path::PathBuf, process};

use certforge::certificate::generate_public_id;
use certforge::delivery::pdf_filename;
use certforge::qr::{QrEncoder, StaticQr};
use certforge::{
    Certificate, Identity, NewCertificate, NewTemplate, Renderer, Role, ServiceConfig, Template,
};
use uuid::Uuid;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("render") => render(&args),
        Some("new-id") => println!("{}", generate_public_id()),
        Some("--help") | Some("-h") => print_usage(&args[0]),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_usage(&args[0]);
            process::exit(1);
        }
        None => {
            print_usage(&args[0]);
            process::exit(1);
        }
    }
}

fn render(args: &[String]) {
    let mut positional: Vec<PathBuf> = Vec::new();
    let mut qr_path: Option<PathBuf> = None;
    let mut html_path: Option<PathBuf> = None;
    let mut asset_roots: Vec<PathBuf> = Vec::new();

    let mut iter = args.iter().skip(2);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--qr" => qr_path = Some(flag_value(&mut iter, "--qr", &args[0])),
            "--html" => html_path = Some(flag_value(&mut iter, "--html", &args[0])),
            "--assets" => asset_roots.push(flag_value(&mut iter, "--assets", &args[0])),
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional.len() == 3 {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional.push(PathBuf::from(path));
            }
        }
    }

    if positional.len() < 2 {
        eprintln!("Error: a certificate and a template file are required.");
        print_usage(&args[0]);
        process::exit(1);
    }

    let cert = or_exit(load_certificate(&positional[0]));
    let template = or_exit(load_template(&positional[1]));

    let mut config = ServiceConfig::from_env();
    if !asset_roots.is_empty() {
        config.render.asset_roots = asset_roots;
    }

    let qr = match qr_path {
        Some(p) => {
            let encoder = or_exit(StaticQr::from_file(&p).map_err(|e| e.to_string()));
            let url = config.verification_url(&cert.certificate_id);
            Some(or_exit(encoder.encode(&url).map_err(|e| e.to_string())))
        }
        None => None,
    };

    let renderer = Renderer::new(config.render.clone());

    if let Some(html_out) = html_path {
        let page = or_exit(
            renderer
                .compose(&cert, &template, qr.as_deref())
                .map_err(|e| e.to_string()),
        );
        write_or_exit(&html_out, page.to_html().as_bytes());
        eprintln!("Wrote '{}'", html_out.display());
    }

    let output = positional.get(2).cloned().unwrap_or_else(|| {
        positional[0]
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(pdf_filename(&cert))
    });

    match renderer.render(&cert, &template, qr.as_deref()) {
        Ok(bytes) => {
            write_or_exit(&output, &bytes);
            eprintln!("Wrote '{}' ({} bytes)", output.display(), bytes.len());
        }
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            process::exit(1);
        }
    }
}

/// A stored certificate record, or a creation body issued on the spot.
fn load_certificate(path: &Path) -> Result<Certificate, String> {
    let json = read(path)?;
    if let Ok(cert) = serde_json::from_str::<Certificate>(&json) {
        return Ok(cert);
    }
    let new: NewCertificate = serde_json::from_str(&json)
        .map_err(|e| format!("Invalid certificate '{}': {e}", path.display()))?;
    new.into_certificate(&Identity::new("certforge", Role::Issuer), None)
        .map_err(|e| format!("Invalid certificate '{}': {e}", path.display()))
}

/// A stored template record, or a creation body.
fn load_template(path: &Path) -> Result<Template, String> {
    let json = read(path)?;
    let template = match serde_json::from_str::<Template>(&json) {
        Ok(t) => t,
        Err(_) => serde_json::from_str::<NewTemplate>(&json)
            .map_err(|e| format!("Invalid template '{}': {e}", path.display()))?
            .into_template(Uuid::nil())
            .map_err(|e| format!("Invalid template '{}': {e}", path.display()))?,
    };
    template
        .layout
        .validate()
        .map_err(|e| format!("Invalid template '{}': {e}", path.display()))?;
    Ok(template)
}

fn read(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading '{}': {e}", path.display()))
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> PathBuf {
    match iter.next() {
        Some(v) => PathBuf::from(v),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn or_exit<T>(result: Result<T, String>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    })
}

fn write_or_exit(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating output directory: {e}");
                process::exit(1);
            }
        }
    }
    if let Err(e) = fs::write(path, bytes) {
        eprintln!("Error writing '{}': {e}", path.display());
        process::exit(1);
    }
}

fn print_usage(prog: &str) {
    eprintln!("certforge – certificate renderer");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} render <certificate.json> <template.json> [output.pdf] [flags]");
    eprintln!("  {prog} new-id");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <certificate.json>  Certificate record or creation body");
    eprintln!("  <template.json>     Template record or creation body (name, backgroundUrl, layout)");
    eprintln!("  [output.pdf]        Output path (default: Certificate-<id>.pdf next to the certificate)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --qr <image>        PNG/JPEG drawn in the qrCode box");
    eprintln!("  --html <out.html>   Also write the composed page as HTML");
    eprintln!("  --assets <dir>      Asset root for backgrounds and signatures (repeatable)");
    eprintln!("  --help              Print this message");
    eprintln!();
    eprintln!("Environment: CLIENT_URL, ASSET_ROOTS, RENDER_TIMEOUT_SECS, RUST_LOG");
}
