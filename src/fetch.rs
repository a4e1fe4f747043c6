use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue, USER_AGENT};

use crate::error::ArchiveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub name: String,
    pub value: String,
}

impl Cookie {
    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let domain = self.domain.trim_start_matches('.');
        let host_matches = host.eq_ignore_ascii_case(domain)
            || (self.include_subdomains
                && host.len() > domain.len()
                && host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase())));
        host_matches && url.path().starts_with(&self.path)
    }
}

/// Netscape cookie jar handed to every fetch.
#[derive(Debug, Clone)]
pub struct AuthContext {
    path: Utf8PathBuf,
    cookies: Vec<Cookie>,
}

impl AuthContext {
    pub fn load(path: &Utf8Path) -> Result<Self, ArchiveError> {
        if !path.as_std_path().exists() {
            return Err(ArchiveError::MissingAuthContext(path.to_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| ArchiveError::AuthRead(path.to_path_buf()))?;
        let cookies = parse_cookie_jar(&content);
        tracing::debug!(path = %path, cookies = cookies.len(), "loaded cookie file");
        Ok(Self {
            path: path.to_path_buf(),
            cookies,
        })
    }

    pub fn new(path: Utf8PathBuf, cookies: Vec<Cookie>) -> Self {
        Self { path, cookies }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let pairs = self
            .cookies
            .iter()
            .filter(|cookie| cookie.matches(url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

pub fn parse_cookie_jar(content: &str) -> Vec<Cookie> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let line = match line.strip_prefix("#HttpOnly_") {
                Some(rest) => rest,
                None if line.starts_with('#') || line.trim().is_empty() => return None,
                None => line,
            };
            let fields = line.split('\t').collect::<Vec<_>>();
            let &[domain, subdomains, path, secure, _expires, name, value] = fields.as_slice() else {
                return None;
            };
            Some(Cookie {
                domain: domain.to_string(),
                include_subdomains: subdomains.eq_ignore_ascii_case("TRUE"),
                path: path.to_string(),
                secure: secure.eq_ignore_ascii_case("TRUE"),
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub auth: &'a AuthContext,
    pub destination: &'a Path,
    pub timeout: Duration,
}

/// Resolves one URL into a file at `request.destination`.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), ArchiveError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), ArchiveError> {
        (**self).fetch(request)
    }
}

#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
    internal_retries: u32,
}

impl YtDlpFetcher {
    pub fn new() -> Result<Self, ArchiveError> {
        let program = find_in_path("yt-dlp").ok_or_else(|| {
            ArchiveError::MissingTool("yt-dlp (install it with `pip install yt-dlp`)".to_string())
        })?;
        Ok(Self::with_program(program))
    }

    pub fn with_program(program: PathBuf) -> Self {
        Self {
            program,
            internal_retries: 5,
        }
    }

    pub fn version(&self) -> Option<String> {
        tool_version(&self.program, &["--version"])
    }

    fn args(&self, request: &FetchRequest<'_>) -> Vec<String> {
        vec![
            "-o".to_string(),
            request.destination.to_string_lossy().to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            "best".to_string(),
            "--cookies".to_string(),
            request.auth.path().to_string(),
            "--socket-timeout".to_string(),
            request.timeout.as_secs().to_string(),
            "--retries".to_string(),
            self.internal_retries.to_string(),
            request.url.to_string(),
        ]
    }
}

impl Fetcher for YtDlpFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), ArchiveError> {
        let output = Command::new(&self.program)
            .args(self.args(request))
            .output()
            .map_err(|err| ArchiveError::FetchTool(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("yt-dlp exited with {}", output.status)
        } else {
            stderr
        };
        Err(ArchiveError::FetchTool(message))
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// `timeout` bounds connecting and every single wait on the socket.
    /// A transfer that keeps delivering bytes is never cut off.
    pub fn new(timeout: Duration) -> Result<Self, ArchiveError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tiktok-archive/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ArchiveError::FetchHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| ArchiveError::FetchHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<(), ArchiveError> {
        let url = Url::parse(request.url)
            .map_err(|err| ArchiveError::FetchHttp(format!("invalid url {}: {err}", request.url)))?;
        // A per-request timeout would become a deadline on the whole body.
        let mut builder = self.client.get(url.clone());
        if let Some(cookies) = request.auth.cookie_header(&url) {
            builder = builder.header(COOKIE, cookies);
        }
        let mut response = builder
            .send()
            .map_err(|err| ArchiveError::FetchHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(ArchiveError::FetchStatus { status, message });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !is_video_content(content_type) {
            return Err(ArchiveError::FetchStatus {
                status: response.status().as_u16(),
                message: format!("expected a video, got content type {content_type:?}"),
            });
        }

        let parent = request
            .destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".tiktok-archive-part")
            .tempfile_in(parent)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| ArchiveError::FetchHttp(err.to_string()))?;
        temp.persist(request.destination)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn is_video_content(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("video/") || mime == "application/octet-stream"
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use assert_matches::assert_matches;

    use super::*;

    const JAR: &str = "# Netscape HTTP Cookie File\n\
        .tiktok.com\tTRUE\t/\tTRUE\t1999999999\tsessionid\tabc\n\
        #HttpOnly_.tiktok.com\tTRUE\t/\tTRUE\t1999999999\ttt_csrf\txyz\n\
        www.example.com\tFALSE\t/private\tFALSE\t0\tlocal\t1\n\
        broken line without tabs\n";

    #[test]
    fn parses_netscape_jar() {
        let cookies = parse_cookie_jar(JAR);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[0].name, "sessionid");
        assert_eq!(cookies[1].name, "tt_csrf");
        assert!(!cookies[2].include_subdomains);
    }

    #[test]
    fn cookie_header_matches_domain_and_path() {
        let auth = AuthContext::new(Utf8PathBuf::from("Cookies.txt"), parse_cookie_jar(JAR));

        let url = Url::parse("https://www.tiktok.com/@user/video/1").unwrap();
        assert_eq!(
            auth.cookie_header(&url).as_deref(),
            Some("sessionid=abc; tt_csrf=xyz")
        );

        let insecure = Url::parse("http://www.tiktok.com/").unwrap();
        assert_eq!(auth.cookie_header(&insecure), None);

        let other = Url::parse("http://www.example.com/public").unwrap();
        assert_eq!(auth.cookie_header(&other), None);
        let private = Url::parse("http://www.example.com/private/x").unwrap();
        assert_eq!(auth.cookie_header(&private).as_deref(), Some("local=1"));
    }

    #[test]
    fn yt_dlp_arguments() {
        let fetcher = YtDlpFetcher::with_program(PathBuf::from("yt-dlp"));
        let auth = AuthContext::new(Utf8PathBuf::from("Cookies.txt"), Vec::new());
        let request = FetchRequest {
            url: "https://t.example/v",
            auth: &auth,
            destination: Path::new("out/video.mp4"),
            timeout: Duration::from_secs(30),
        };
        let args = fetcher.args(&request);
        assert_eq!(args[1], "out/video.mp4");
        assert!(args.windows(2).any(|pair| pair == ["--cookies", "Cookies.txt"]));
        assert!(args.windows(2).any(|pair| pair == ["--socket-timeout", "30"]));
        assert_eq!(args.last().map(String::as_str), Some("https://t.example/v"));
    }

    /// Serves one response, writing each body chunk after `pause`.
    fn serve_once(content_type: &'static str, chunks: Vec<Vec<u8>>, pause: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buf).unwrap();
                if read == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..read]);
            }
            let length: usize = chunks.iter().map(Vec::len).sum();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.flush().unwrap();
            for chunk in chunks {
                thread::sleep(pause);
                if stream.write_all(&chunk).and_then(|_| stream.flush()).is_err() {
                    return;
                }
            }
        });
        format!("http://{addr}/video")
    }

    fn http_request<'a>(url: &'a str, auth: &'a AuthContext, destination: &'a Path) -> FetchRequest<'a> {
        FetchRequest {
            url,
            auth,
            destination,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn http_transfer_longer_than_timeout_completes_while_bytes_arrive() {
        let temp = tempfile::tempdir().unwrap();
        let destination = temp.path().join("video.mp4");
        let url = serve_once("video/mp4", vec![vec![7u8; 100]; 6], Duration::from_millis(400));
        let auth = AuthContext::new(Utf8PathBuf::from("Cookies.txt"), Vec::new());

        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        fetcher.fetch(&http_request(&url, &auth, &destination)).unwrap();

        assert_eq!(std::fs::read(&destination).unwrap().len(), 600);
    }

    #[test]
    fn http_rejects_html_page() {
        let temp = tempfile::tempdir().unwrap();
        let destination = temp.path().join("video.mp4");
        let page = b"<html><body>share page</body></html>".to_vec();
        let url = serve_once("text/html; charset=utf-8", vec![page], Duration::ZERO);
        let auth = AuthContext::new(Utf8PathBuf::from("Cookies.txt"), Vec::new());

        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch(&http_request(&url, &auth, &destination)).unwrap_err();

        assert_matches!(err, ArchiveError::FetchStatus { status: 200, message } if message.contains("text/html"));
        assert!(!destination.exists());
    }

    #[test]
    fn video_content_types() {
        assert!(is_video_content("video/mp4"));
        assert!(is_video_content("Video/MP4; codecs=avc1"));
        assert!(is_video_content("application/octet-stream"));
        assert!(!is_video_content("text/html; charset=utf-8"));
        assert!(!is_video_content(""));
    }
}
