//! NZB fixtures and yEnc content generators

use std::fmt::Write as _;
use std::time::Duration;
use usenet_fetch::{Config, FetchConfig, RetryConfig, ServerConfig};

/// One file to be published: its name, content, and how many articles it spans
pub struct PostedFile {
    pub name: String,
    pub content: Vec<u8>,
    pub parts: usize,
}

impl PostedFile {
    pub fn new(name: &str, len: usize, parts: usize) -> Self {
        let seed = name.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        let content = (0..len)
            .map(|i| (seed.wrapping_add(i as u32).wrapping_mul(2_654_435_761) >> 24) as u8)
            .collect();
        Self {
            name: name.to_string(),
            content,
            parts,
        }
    }

    /// 1-based inclusive byte range of `part`
    pub fn range(&self, part: usize) -> (usize, usize) {
        let chunk = self.content.len().div_ceil(self.parts);
        let begin = (part - 1) * chunk + 1;
        let end = (part * chunk).min(self.content.len());
        (begin, end)
    }

    pub fn message_id(&self, part: usize) -> String {
        format!("{}.part{}@fixture.test", self.name, part)
    }

    /// Article body of `part`, yEnc-encoded by nntp-rs
    pub fn article(&self, part: usize) -> Vec<u8> {
        let (begin, end) = self.range(part);
        let part_info = (self.parts > 1).then(|| {
            (
                part as u32,
                self.parts as u32,
                begin as u64,
                end as u64,
                self.content.len() as u64,
            )
        });
        nntp_rs::yenc_encode(&self.content[begin - 1..end], &self.name, 128, part_info).unwrap()
    }
}

/// Build an NZB listing every part of every file
pub fn nzb_for(files: &[PostedFile]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
"#,
    );
    for file in files {
        let _ = writeln!(
            xml,
            r#"  <file poster="fixture@example.com" date="1700000000" subject="fixture [1/1] - &quot;{}&quot; yEnc (1/{})">"#,
            file.name, file.parts
        );
        xml.push_str("    <groups>\n      <group>alt.binaries.test</group>\n    </groups>\n    <segments>\n");
        for part in 1..=file.parts {
            let (begin, end) = file.range(part);
            let _ = writeln!(
                xml,
                r#"      <segment bytes="{}" number="{}">{}</segment>"#,
                end - begin + 1,
                part,
                file.message_id(part)
            );
        }
        xml.push_str("    </segments>\n  </file>\n");
    }
    xml.push_str("</nzb>\n");
    xml
}

/// Configuration with a fast retry schedule for tests
pub fn test_config(connections: usize, max_tries: u32) -> Config {
    Config {
        server: ServerConfig {
            host: "news.fixture.test".to_string(),
            port: 119,
            tls: false,
            username: None,
            password: None,
        },
        fetch: FetchConfig {
            connections,
            max_tries,
            claim_lease: Duration::from_secs(300),
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}
