#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use pfnotify_log_pipeline::parser::{Classified, LineClassifier};

/// Structured input: a plausible envelope around fuzzed CSV fields.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    pri: u8,
    process: FuzzProcess,
    pid: Option<u16>,
    fields: Vec<String>,
    /// Raw line tried as-is as well
    raw: String,
}

#[derive(Arbitrary, Debug)]
enum FuzzProcess {
    Filterlog,
    Dhcpd,
    Other(String),
}

impl FuzzProcess {
    fn as_str(&self) -> &str {
        match self {
            FuzzProcess::Filterlog => "filterlog",
            FuzzProcess::Dhcpd => "dhcpd",
            FuzzProcess::Other(name) => name,
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let classifier = LineClassifier::builder().build();

    let tag = match input.pid {
        Some(pid) => format!("{}[{pid}]", input.process.as_str()),
        None => input.process.as_str().to_owned(),
    };
    let fields: Vec<&str> = input.fields.iter().take(40).map(String::as_str).collect();
    let line = format!(
        "<{}>May 22 00:32:39 pfsense {tag}: {}",
        input.pri,
        fields.join(",")
    );

    for candidate in [line.as_str(), input.raw.as_str()] {
        if let Ok(Classified::Entry(entry)) = classifier.classify(candidate) {
            let _ = entry.to_string();
        }
    }
});
