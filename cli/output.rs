use byte_unit::{Byte, UnitType};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use git_dump_core::{DumpReport, TokenEstimate};

pub fn readable_size(bytes: u64) -> String {
    Byte::from_u128(bytes as u128)
        .unwrap_or_default()
        .get_appropriate_unit(UnitType::Binary)
        .to_string()
}

fn describe_tokens(estimate: &TokenEstimate) -> String {
    let qualifier = if estimate.method.is_exact() {
        ""
    } else {
        "~"
    };
    format!("{}{} ({})", qualifier, estimate.count, estimate.method)
}

fn describe_skipped(report: &DumpReport) -> String {
    let by_reason = report.skipped_by_reason();
    if by_reason.is_empty() {
        return "0".to_string();
    }
    let parts: Vec<String> = by_reason
        .iter()
        .map(|(reason, count)| format!("{}: {}", reason, count))
        .collect();
    format!("{} ({})", report.skipped.len(), parts.join(", "))
}

fn print_counts(report: &DumpReport) {
    println!(
        "{:<16} {}",
        "Included:".green(),
        format!(
            "{} file(s), {}",
            report.included.len(),
            readable_size(report.total_bytes)
        )
        .cyan()
    );
    println!("{:<16} {}", "Skipped:".green(), describe_skipped(report).cyan());
    println!(
        "{:<16} {}",
        "Ignored:".green(),
        report.ignored.to_string().cyan()
    );
    if report.not_included > 0 {
        println!(
            "{:<16} {}",
            "Not included:".green(),
            report.not_included.to_string().cyan()
        );
    }
    if let Some(tokens) = &report.tokens {
        println!("{:<16} {}", "Est. Tokens:".green(), describe_tokens(tokens).cyan());
    }
    if report.matcher_degraded {
        println!(
            "{}",
            "Some ignore rules were matched as plain globs (negation unsupported).".yellow()
        );
    }
}

pub fn print_summary(report: &DumpReport) {
    println!();
    if report.included.is_empty() {
        println!("{}", "No files were dumped.".yellow());
    }
    print_counts(report);
    println!(
        "{:<16} {}",
        "Written:".green(),
        readable_size(report.bytes_written).cyan()
    );
    println!(
        "{} Result saved to: {}",
        "✅".green(),
        report.output_path.display().to_string().blue()
    );
}

pub fn print_dry_run_report(report: &DumpReport) {
    println!();
    println!("{}", " Dry Run Summary ".green().bold().underline());
    println!(
        "{} {}",
        "Would write:".green(),
        report.output_path.display().to_string().blue()
    );
    print_counts(report);
    println!(
        "{:<16} {}",
        "Output size:".green(),
        readable_size(report.bytes_written).cyan()
    );

    if report.included.is_empty() {
        println!("\n{}", "(No files would be dumped)".yellow());
    } else {
        println!("\n{}", " Files ".green().bold().underline());
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Path").fg(Color::Green),
            Cell::new("Size").fg(Color::Green),
        ]);
        for file in &report.included {
            table.add_row(vec![
                Cell::new(&file.relative_path).fg(Color::Cyan),
                Cell::new(readable_size(file.size))
                    .set_alignment(CellAlignment::Right)
                    .fg(Color::DarkGrey),
            ]);
        }
        println!("{table}");
    }

    if !report.skipped.is_empty() {
        println!("\n{}", " Skipped ".yellow().bold().underline());
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Path").fg(Color::Yellow),
            Cell::new("Reason").fg(Color::Yellow),
        ]);
        for file in &report.skipped {
            table.add_row(vec![
                Cell::new(&file.relative_path),
                Cell::new(file.reason.label()).fg(Color::DarkGrey),
            ]);
        }
        println!("{table}");
    }

    if let Some(tree) = &report.tree {
        println!("\n{}", " Structure ".green().bold().underline());
        print!("{}", tree);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_dump_core::Tokenizer;

    #[test]
    fn test_readable_size_uses_binary_units() {
        assert!(readable_size(0).ends_with('B'));
        assert!(readable_size(2048).contains("KiB"));
    }

    #[test]
    fn test_token_description_marks_estimates() {
        let exact = TokenEstimate {
            count: 12,
            method: Tokenizer::Cl100k,
        };
        assert_eq!(describe_tokens(&exact), "12 (tiktoken cl100k_base)");
        let rough = TokenEstimate {
            count: 3,
            method: Tokenizer::CharHeuristic,
        };
        assert!(describe_tokens(&rough).starts_with("~3"));
    }
}
