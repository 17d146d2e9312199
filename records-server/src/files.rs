use anyhow::Context;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

// Pinned so DASH manifests and segments get the types players expect.
const DASH_TYPES: [(&str, &str); 2] = [
    ("mpd", "application/dash+xml"),
    ("m4s", "video/iso.segment"),
];

#[derive(Debug, PartialEq)]
pub enum Resolved {
    File(PathBuf),
    /// A directory requested without its trailing slash.
    Redirect(String),
    Listing { dir: PathBuf, url_path: String },
    NotFound,
}

pub struct DocumentRoot {
    root: PathBuf,
}

impl DocumentRoot {
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .with_context(|| format!("Failed to open {}", root.as_ref().display()))?;
        if !root.is_dir() {
            anyhow::bail!("Not a directory: {}", root.display());
        }
        Ok(DocumentRoot { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Maps a request target onto the filesystem below the root.
    pub fn resolve(&self, target: &str) -> io::Result<Resolved> {
        let url_path = strip_query(target);
        let path = self.translate_path(url_path);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Resolved::NotFound),
            Err(e) => return Err(e),
        };

        if !metadata.is_dir() {
            // A trailing slash on a file name is treated as a miss.
            if url_path.ends_with('/') {
                return Ok(Resolved::NotFound);
            }
            return Ok(Resolved::File(path));
        }

        if !url_path.ends_with('/') {
            return Ok(Resolved::Redirect(format!("{}/", url_path)));
        }
        for index in INDEX_FILES.iter() {
            let candidate = path.join(index);
            if candidate.is_file() {
                return Ok(Resolved::File(candidate));
            }
        }
        Ok(Resolved::Listing {
            dir: path,
            url_path: percent_decode(url_path),
        })
    }

    fn translate_path(&self, url_path: &str) -> PathBuf {
        let decoded = percent_decode(url_path);
        let mut segments: Vec<&str> = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s if s.contains('\\') || s.contains('\0') => {}
                s => segments.push(s),
            }
        }
        segments
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

fn strip_query(target: &str) -> &str {
    let end = target.find(|c: char| c == '?' || c == '#').unwrap_or(target.len());
    &target[..end]
}

pub fn content_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    if let Some(ext) = ext {
        if let Some((_, t)) = DASH_TYPES.iter().find(|(e, _)| *e == ext) {
            return t.to_string();
        }
    }
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

pub fn list_directory(dir: &Path, url_path: &str) -> io::Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort_by_key(|name| name.to_lowercase());

    let title = format!("Directory listing for {}", html_escape(url_path));
    let mut html = format!(
        "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{0}</title>\n</head>\n<body>\n<h1>{0}</h1>\n<hr>\n<ul>\n",
        title
    );
    for name in &names {
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            percent_encode(name),
            html_escape(name)
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    Ok(html)
}

pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(byte) = s
                .get(i + 1..i + 3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &byte in s.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
