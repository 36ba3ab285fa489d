use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use itertools::Itertools;

use crate::{types::BatchResult, utils::get_random_string};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment: PathBuf,
}

pub trait Mailer {
    fn send(&self, message: &MailMessage) -> anyhow::Result<()>;
}

/// Hands messages to a sendmail-compatible binary.
pub struct Sendmail {
    binary: PathBuf,
    from: Option<String>,
}

impl Sendmail {
    pub fn new(binary: PathBuf, from: Option<String>) -> Self {
        Sendmail { binary, from }
    }

    /// Renders `message` as a multipart/mixed MIME document.
    pub fn render(&self, message: &MailMessage) -> anyhow::Result<String> {
        let data = fs::read(&message.attachment).context(format!(
            "could not read attachment {:?}",
            &message.attachment
        ))?;
        let filename = message
            .attachment
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment.pdf".into());
        let boundary = format!("=_{}", get_random_string(24));

        let mut out = String::new();
        if let Some(from) = &self.from {
            out.push_str(&format!("From: {}\r\n", from));
        }
        out.push_str(&format!("To: {}\r\n", message.to.join(", ")));
        out.push_str(&format!("Subject: {}\r\n", encode_header(&message.subject)));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            boundary
        ));

        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str("Content-Type: text/html; charset=utf-8\r\n");
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        out.push_str(&wrap_base64(message.html_body.as_bytes()));

        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str(&format!(
            "Content-Type: application/pdf; name=\"{}\"\r\n",
            filename
        ));
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        out.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
            filename
        ));
        out.push_str(&wrap_base64(&data));
        out.push_str(&format!("--{}--\r\n", boundary));
        Ok(out)
    }
}

impl Mailer for Sendmail {
    fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        let rendered = self.render(message)?;
        let mut child = Command::new(&self.binary)
            .args(["-t", "-oi"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context(format!("could not spawn {:?}", self.binary))?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin
                .write_all(rendered.as_bytes())
                .context(format!("could not pipe the message to {:?}", self.binary)),
            None => Err(anyhow!("no stdin for {:?}", self.binary)),
        };
        if let Err(e) = written {
            // never leave a half-fed sendmail running or unreaped
            let _ = child.kill();
            match child.wait() {
                Ok(status) => debug!("{:?} stopped with {}", self.binary, status),
                Err(wait_err) => warn!("could not reap {:?}: {}", self.binary, wait_err),
            }
            return Err(e);
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(anyhow!(
                "{:?} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        info!("e-mail handed to {:?} for {} recipients", self.binary, message.to.len());
        Ok(())
    }
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 76 * 2 + 2);
    for chunk in encoded.as_bytes().chunks(76) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

/// Reads the addresses of the first `.txt` or `.csv` file in `dir`.
pub fn read_recipients(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut candidates = fs::read_dir(dir)
        .context(format!("could not read recipients directory {:?}", dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| {
                        let ext = ext.to_string_lossy().to_lowercase();
                        ext == "txt" || ext == "csv"
                    })
                    .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    candidates.sort();

    let file = match candidates.first() {
        Some(f) => f,
        None => return Ok(vec![]),
    };
    debug!("reading recipients from {:?}", file);
    let raw = fs::read_to_string(file).context(format!("could not read {:?}", file))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .flat_map(|l| l.split(|c: char| c == ',' || c == ';'))
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect())
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn subject(prefix: &str, stamp: &str) -> String {
    format!("{} ({})", prefix, stamp)
}

/// HTML body listing processed reports and, when any, the failures.
pub fn build_html(stamp: &str, batch: &BatchResult, signature: &str) -> String {
    let processed = batch
        .succeeded
        .iter()
        .map(|a| {
            format!(
                "<li>{} - <a href=\"{}\">open</a></li>",
                escape(&a.report),
                escape(&a.url)
            )
        })
        .join("");

    let failures = if batch.failed.is_empty() {
        String::new()
    } else {
        format!(
            "<p><b>Failures:</b></p><ul>{}</ul>",
            batch
                .failed
                .iter()
                .map(|n| format!("<li>{}</li>", escape(n)))
                .join("")
        )
    };

    format!(
        "<p>Good morning,</p>\n\
         <p>Please find attached the consolidated daily PDF (date {}).</p>\n\
         <p>Processed reports:</p>\n\
         <ul>{}</ul>\n\
         {}\n\
         <p>Regards,<br>{}</p>\n",
        stamp,
        processed,
        failures,
        escape(signature)
    )
}
