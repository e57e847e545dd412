//! Environment check command.

use console::style;

use rollcall::config::Settings;
use rollcall::llm::{GeminiEndpoint, InferenceEndpoint};
use rollcall::repository::open_reference_store;
use rollcall_analysis::ocr::tool_hint;

fn status_line(name: &str, ok: bool, detail: Option<String>) {
    let status = if ok {
        style("✓ found").green()
    } else {
        style("✗ missing").red()
    };
    println!("  {:<15} {}", name, status);
    if let Some(detail) = detail {
        println!("                  {}", style(detail).dim());
    }
}

/// Report whether everything a batch run needs is in place.
pub async fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("rollcall environment").bold());
    println!("{}", "-".repeat(50));

    println!("\n{}", style("Tools:").cyan());
    let mut ready = true;
    for tool in ["pdftoppm", "tesseract"] {
        let hint = tool_hint(tool);
        // tesseract only feeds the heuristic classifier, so it is optional
        if tool == "pdftoppm" && hint.is_some() {
            ready = false;
        }
        status_line(tool, hint.is_none(), hint);
    }

    println!("\n{}", style("AI endpoint:").cyan());
    let endpoint = GeminiEndpoint::new(&settings.gateway)?;
    let configured = endpoint.is_configured();
    if !configured {
        ready = false;
    }
    status_line(
        "gemini",
        configured,
        Some(format!(
            "model {}, {} requests/min{}",
            settings.gateway.model,
            settings.gateway.requests_per_minute,
            if configured { "" } else { "; set GEMINI_API_KEY" }
        )),
    );

    println!("\n{}", style("Reference data:").cyan());
    match &settings.paths.reference {
        Some(path) => match open_reference_store(path) {
            Ok(_) => status_line("reference", true, Some(path.display().to_string())),
            Err(e) => {
                ready = false;
                status_line("reference", false, Some(format!("{}: {}", path.display(), e)));
            }
        },
        None => status_line(
            "reference",
            false,
            Some("paths.reference not set; credentials will not be matched".to_string()),
        ),
    }

    println!();
    if ready {
        println!("{} Ready to process", style("✓").green());
        Ok(())
    } else {
        Err(anyhow::anyhow!("Environment is not ready. See above for details."))
    }
}
