//! MIME message serialization.
//!
//! A message without attachments is a single `text/plain` body. With
//! attachments it becomes `multipart/mixed`: an optional text part followed
//! by one base64 part per attachment.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::Utc;

use crate::types::*;

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8; format=flowed";
const BASE64_LINE: usize = 76;

/// Serialize `email` into the text sent after DATA. Lines end with CRLF.
pub fn build_message(email: &Email) -> SmtpResult<String> {
    email.validate()?;

    let estimated: usize = email.attachments.iter().map(|a| a.data.len() * 4 / 3 + 256).sum();
    let mut out = String::with_capacity(email.body.len() + estimated + 512);

    write_header(&mut out, "Date", &Utc::now().to_rfc2822());
    write_header(
        &mut out,
        "Message-ID",
        &format!("<{}@{}>", uuid::Uuid::new_v4().simple(), sender_domain(&email.from)),
    );
    write_header(&mut out, "To", &email.to[0]);
    for cc in &email.to[1..] {
        write_header(&mut out, "Cc", cc);
    }
    write_header(&mut out, "From", &email.from);
    write_header(&mut out, "Subject", &encode_header_value(&email.subject));

    if email.attachments.is_empty() {
        write_header(&mut out, "Content-Type", TEXT_CONTENT_TYPE);
        out.push_str("\r\n");
        push_lines(&mut out, &email.body);
        return Ok(out);
    }

    let boundary = format!("----=_Part_{}", uuid::Uuid::new_v4().simple());
    write_header(&mut out, "MIME-Version", "1.0");
    // boundary parameter on a folded continuation line
    write_header(
        &mut out,
        "Content-Type",
        &format!("multipart/mixed;\r\n boundary=\"{}\"", boundary),
    );
    write_header(&mut out, "Content-Language", "en-US");
    out.push_str("\r\n");

    if !email.body.is_empty() {
        start_part(&mut out, &boundary);
        write_header(&mut out, "Content-Type", TEXT_CONTENT_TYPE);
        write_header(&mut out, "Content-Transfer-Encoding", "8bit");
        out.push_str("\r\n");
        push_lines(&mut out, &email.body);
        out.push_str("\r\n");
    }

    for att in &email.attachments {
        start_part(&mut out, &boundary);
        write_attachment(&mut out, att);
    }

    out.push_str("--");
    out.push_str(&boundary);
    out.push_str("--\r\n");
    Ok(out)
}

fn start_part(out: &mut String, boundary: &str) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str("\r\n");
}

fn write_attachment(out: &mut String, att: &Attachment) {
    let name = sanitize_header(&att.filename);
    write_header(out, "Content-Type", &sanitize_header(&att.content_type));
    write_header(out, "Content-Description", &encode_header_value(&name));
    write_header(out, "Content-Transfer-Encoding", "base64");
    write_header(
        out,
        "Content-Disposition",
        &format!("attachment;filename=\"{}\"", quote_param(&encode_header_value(&name))),
    );
    out.push_str("\r\n");
    out.push_str(&encode_base64_lines(&att.data));
    out.push_str("\r\n");
}

fn write_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Copy `text` normalizing every line ending to CRLF.
fn push_lines(out: &mut String, text: &str) {
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        if lines.peek().is_some() {
            out.push_str("\r\n");
        }
    }
}

fn sender_domain(from: &str) -> &str {
    mailbox_address(from)
        .rsplit_once('@')
        .map(|(_, d)| d)
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost")
}

/// Replace CR and LF so a value cannot start a new header.
fn sanitize_header(value: &str) -> String {
    value.replace(&['\r', '\n'][..], " ")
}

fn quote_param(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// RFC 2047 `B` encoding for non-ASCII header values.
pub fn encode_header_value(value: &str) -> String {
    let value = sanitize_header(value);
    if value.is_ascii() {
        value
    } else {
        format!("=?UTF-8?B?{}?=", B64.encode(value.as_bytes()))
    }
}

/// Base64 with CRLF line breaks every 76 characters.
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = B64.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2);
    for (i, chunk) in encoded.as_bytes().chunks(BASE64_LINE).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        // base64 output is ASCII, so any chunk boundary is a char boundary
        out.push_str(&encoded[i * BASE64_LINE..i * BASE64_LINE + chunk.len()]);
    }
    out
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn header<'a>(msg: &'a str, name: &str) -> Vec<&'a str> {
        let prefix = format!("{}: ", name);
        msg.split("\r\n\r\n")
            .next()
            .unwrap()
            .split("\r\n")
            .filter_map(|l| l.strip_prefix(prefix.as_str()))
            .collect()
    }

    fn boundary(msg: &str) -> String {
        let start = msg.find("boundary=\"").unwrap() + "boundary=\"".len();
        let end = msg[start..].find('"').unwrap();
        msg[start..start + end].to_string()
    }

    fn sample() -> Email {
        Email::new("me@example.com", "Report", "Hello\nWorld")
            .to("a@example.com")
            .to("b@example.com")
            .to("c@example.com")
    }

    #[test]
    fn plain_message_headers_and_body() {
        let msg = build_message(&sample()).unwrap();
        assert_eq!(header(&msg, "To"), vec!["a@example.com"]);
        assert_eq!(header(&msg, "Cc"), vec!["b@example.com", "c@example.com"]);
        assert_eq!(header(&msg, "From"), vec!["me@example.com"]);
        assert_eq!(header(&msg, "Subject"), vec!["Report"]);
        assert_eq!(
            header(&msg, "Content-Type"),
            vec!["text/plain; charset=utf-8; format=flowed"]
        );
        assert!(header(&msg, "MIME-Version").is_empty());
        assert_eq!(header(&msg, "Date").len(), 1);
        assert!(header(&msg, "Message-ID")[0].ends_with("@example.com>"));
        assert!(msg.ends_with("\r\n\r\nHello\r\nWorld"));
    }

    #[test]
    fn multipart_message_layout() {
        let email = sample().attach(Attachment::new("notes.txt", b"attachment body".to_vec()));
        let msg = build_message(&email).unwrap();
        let b = boundary(&msg);

        assert_eq!(header(&msg, "MIME-Version"), vec!["1.0"]);
        assert_eq!(header(&msg, "Content-Type"), vec!["multipart/mixed;"]);
        assert!(msg.contains(&format!("\r\n boundary=\"{}\"\r\n", b)));
        assert_eq!(header(&msg, "Content-Language"), vec!["en-US"]);

        let parts: Vec<&str> = msg.split(&format!("--{}", b)).collect();
        // preamble, text part, attachment, closing "--\r\n"
        assert_eq!(parts.len(), 4);
        assert!(parts[1].contains("Content-Type: text/plain; charset=utf-8; format=flowed\r\n"));
        assert!(parts[1].contains("Content-Transfer-Encoding: 8bit\r\n"));
        assert!(parts[1].contains("\r\n\r\nHello\r\nWorld\r\n"));

        assert!(parts[2].contains("Content-Type: application/octet-stream\r\n"));
        assert!(parts[2].contains("Content-Description: notes.txt\r\n"));
        assert!(parts[2].contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(parts[2].contains("Content-Disposition: attachment;filename=\"notes.txt\"\r\n"));
        let payload = parts[2].split("\r\n\r\n").nth(1).unwrap().trim();
        assert_eq!(B64.decode(payload).unwrap(), b"attachment body");

        assert_eq!(parts[3], "--\r\n");
    }

    #[test]
    fn empty_body_skips_text_part() {
        let mut email = sample().attach(Attachment::new("a.bin", vec![1, 2, 3]));
        email.body.clear();
        let msg = build_message(&email).unwrap();
        assert!(!msg.contains("Content-Transfer-Encoding: 8bit"));
        assert_eq!(msg.matches(&format!("--{}\r\n", boundary(&msg))).count(), 1);
    }

    #[test]
    fn custom_content_type_is_kept() {
        let email = sample().attach(
            Attachment::new("r.pdf", vec![0; 10]).with_content_type("application/pdf"),
        );
        let msg = build_message(&email).unwrap();
        assert!(msg.contains("Content-Type: application/pdf\r\n"));
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let mut email = sample();
        email.subject = "Привет".into();
        let msg = build_message(&email).unwrap();
        let subject = header(&msg, "Subject")[0];
        assert!(subject.starts_with("=?UTF-8?B?"));
        assert!(subject.ends_with("?="));
    }

    #[test]
    fn header_injection_is_neutralized() {
        let mut email = sample();
        email.subject = "hi\r\nBcc: victim@example.com".into();
        let msg = build_message(&email).unwrap();
        assert!(header(&msg, "Bcc").is_empty());
    }

    #[test]
    fn base64_lines_are_wrapped() {
        let encoded = encode_base64_lines(&[0xAB; 200]);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 76));
        assert_eq!(lines[0].len(), 76);
        assert_eq!(B64.decode(lines.concat()).unwrap(), vec![0xAB; 200]);
        assert_eq!(encode_base64_lines(b""), "");
    }

    #[test]
    fn missing_recipients_is_message_error() {
        let email = Email::new("me@example.com", "s", "b");
        assert_eq!(
            build_message(&email).unwrap_err().kind,
            SmtpErrorKind::MessageError
        );
    }

    #[test]
    fn display_name_sender_is_kept_in_header() {
        let mut email = sample();
        email.from = "Reports <me@example.com>".into();
        let msg = build_message(&email).unwrap();
        assert_eq!(header(&msg, "From"), vec!["Reports <me@example.com>"]);
        assert!(header(&msg, "Message-ID")[0].ends_with("@example.com>"));
    }

    #[test]
    fn sender_domain_fallback() {
        assert_eq!(sender_domain("me@example.com"), "example.com");
        assert_eq!(sender_domain("Me <me@example.com>"), "example.com");
        assert_eq!(sender_domain("nobody"), "localhost");
    }
}
