use std::env;

use chrono::Utc;
use forti_cert::{CertRef, CertReport, CertType};

fn main() {
    // Use: demo <file>
    // Example: demo 'root-ca.pem'
    let path = env::args().nth(1).expect("usage: demo <pem-file>");
    let text = std::fs::read_to_string(&path).expect("error: couldn't read file");

    let report = CertReport::parse(&text).expect("failed to decode certificate");
    let cert = CertRef {
        kind: CertType::Ca,
        name: path,
    };

    print!("{}", report.render(&cert, Utc::now()));
}
