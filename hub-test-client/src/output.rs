use crate::scenarios::TestResult;
use colored::*;

pub fn print_test_summary(results: &[TestResult]) {
    for result in results {
        let status = if result.passed {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };
        println!(
            "[{}] {} ({:?})",
            status, result.scenario_name, result.duration
        );
        if let Some(message) = &result.message {
            println!("       {}", message.dimmed());
        }
    }

    let passed = results.iter().filter(|r| r.passed).count();
    println!("\n{}/{} scenarios passed", passed, results.len());
}
