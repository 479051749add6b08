// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use tiller_core::Output;

/// Plain terminal output: info and results to stdout, problems to stderr.
#[derive(Default)]
pub struct TerminalOutput;

impl Output for TerminalOutput {
    fn info(&self, text: &str) {
        println!("{text}");
    }

    fn warn(&self, text: &str) {
        eprintln!("warning: {text}");
    }

    fn error(&self, text: &str) {
        eprintln!("error: {text}");
    }

    fn success(&self, text: &str) {
        println!("{text}");
    }

    fn section(&self, title: &str) {
        println!();
        println!("── {title} ──");
    }

    fn blank(&self) {
        println!();
    }
}
