//! OCR a saved screenshot and print what the click pipeline would see.
//! Usage:
//! cargo run -p click-vision --features cli --bin list_text -- <png> [language] [target]

use click_vision::{get_center, select_matches, OcrEngine, TesseractEngine};
use std::path::PathBuf;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <screenshot.png> [language] [target]", args[0]);
        std::process::exit(1);
    }

    let input_path = PathBuf::from(&args[1]);
    let language = args.get(2).map(String::as_str).unwrap_or("chi_sim");

    println!("Loading image: {}", input_path.display());
    let img = match image::open(&input_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("Failed to open image: {}", e);
            std::process::exit(1);
        }
    };
    println!("Image size: {}x{}", img.width(), img.height());

    let engine = match TesseractEngine::new() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    println!("\n=== Transcription ({}) ===", language);
    match engine.transcribe(&img, language) {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => println!("Transcription failed: {}", e),
    }

    let words = match engine.detect(&img, language) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("Detection failed: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n=== Words ===");
    for w in words.iter().filter(|w| !w.text.is_empty()) {
        println!(
            "  {:>5.1}  x={} y={} w={} h={}  {}",
            w.confidence, w.left, w.top, w.width, w.height, w.text
        );
    }

    if let Some(target) = args.get(3) {
        println!("\n=== Matches for {:?} (any confidence) ===", target);
        let matches = select_matches(words, target, 0.0);
        if matches.is_empty() {
            println!("  none");
        }
        for (i, m) in matches.iter().enumerate() {
            let c = get_center(m);
            println!(
                "  #{} {:?} confidence={:.2} center=({}, {})",
                i, m.text, m.confidence, c.x, c.y
            );
        }
    }
}
