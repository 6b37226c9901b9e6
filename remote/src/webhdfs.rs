//! [`FileSystem`] over the WebHDFS REST gateway
//!
//! Each capability call maps to one REST operation. Data operations are redirected by the
//! namenode to a datanode with a `307`, redirects are followed by hand so that the upload body is
//! only ever sent to the datanode.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll, ready};

use anyhow::{Context, anyhow, bail};
use futures::TryStreamExt;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use tokio::io::AsyncWrite;
use tracing::instrument;

use common::fs::{FileReader, FileStatus, FileSystem, FileWriter, FsError};

use crate::client::{ClientOptions, ClientSession, Connector};
use crate::kerberos::KerberosCredential;

const API_PREFIX: &str = "/webhdfs/v1";
const UPLOAD_BUFFER_SIZE: usize = 1 << 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatus {
    #[serde(default)]
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    length: u64,
}

impl WireStatus {
    fn into_status(self, path: &Path) -> FileStatus {
        FileStatus {
            path: if self.path_suffix.is_empty() {
                path.to_path_buf()
            } else {
                path.join(&self.path_suffix)
            },
            is_dir: self.kind == "DIRECTORY",
            length: self.length,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusResponse {
    file_status: WireStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListResponse {
    file_statuses: WireStatusList,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireStatusList {
    file_status: Vec<WireStatus>,
}

#[derive(Debug, Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    remote_exception: RemoteException,
}

#[derive(Debug, Deserialize)]
struct RemoteException {
    exception: String,
    #[serde(default)]
    message: String,
}

/// The namenode answered with a SPNEGO challenge, which this client cannot answer
#[derive(Debug, thiserror::Error)]
#[error("namenode requires SPNEGO authentication for {path:?}, which is not supported ({login})")]
pub struct NegotiateRequired {
    path: PathBuf,
    login: String,
}

fn wants_negotiate(response: &reqwest::Response) -> bool {
    response.status() == StatusCode::UNAUTHORIZED
        && response
            .headers()
            .get_all(reqwest::header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.trim_start().starts_with("Negotiate"))
}

fn remote_error(status: StatusCode, body: &[u8], path: &Path) -> FsError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(ErrorResponse { remote_exception }) => match remote_exception.exception.as_str() {
            "FileNotFoundException" => FsError::NotFound(path.to_path_buf()),
            "FileAlreadyExistsException" => FsError::AlreadyExists(path.to_path_buf()),
            exception => FsError::Other(anyhow!(
                "{exception} on {path:?}: {}",
                remote_exception.message
            )),
        },
        Err(_) if status == StatusCode::NOT_FOUND => FsError::NotFound(path.to_path_buf()),
        Err(_) => FsError::Other(anyhow!(
            "unexpected response {status} for {path:?}: {}",
            String::from_utf8_lossy(body).trim()
        )),
    }
}

async fn check(response: reqwest::Response, path: &Path) -> Result<reqwest::Response, FsError> {
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(remote_error(status, &body, path))
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    path: &Path,
) -> Result<T, FsError> {
    let body = response
        .bytes()
        .await
        .with_context(|| format!("failed reading response for {path:?}"))?;
    let value = serde_json::from_slice(&body)
        .with_context(|| format!("malformed response for {path:?}"))?;
    Ok(value)
}

fn location(response: &reqwest::Response) -> anyhow::Result<Url> {
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .ok_or_else(|| anyhow!("redirect without a location"))?
        .to_str()
        .context("redirect location is not valid text")?;
    Url::parse(location).with_context(|| format!("invalid redirect location {location:?}"))
}

/// Client for one namenode
#[derive(Debug, Clone)]
pub struct WebHdfs {
    client: reqwest::Client,
    base: Url,
    user: String,
    kerberos: Option<KerberosCredential>,
}

impl WebHdfs {
    pub fn new(client: reqwest::Client, base: Url, user: impl Into<String>) -> Self {
        Self {
            client,
            base,
            user: user.into(),
            kerberos: None,
        }
    }

    /// Remember the Kerberos login the session was set up with
    #[must_use]
    pub fn with_kerberos(mut self, credential: Option<KerberosCredential>) -> Self {
        self.kerberos = credential;
        self
    }

    fn negotiate_required(&self, path: &Path) -> NegotiateRequired {
        let login = match &self.kerberos {
            Some(credential) => format!(
                "logged in as {}, ticket cache {:?}",
                credential.principal, credential.ticket_cache
            ),
            None => "no kerberos login, the configuration directory is missing".to_string(),
        };
        NegotiateRequired {
            path: path.to_path_buf(),
            login,
        }
    }

    fn url(&self, path: &Path, op: &str, params: &[(&str, &str)]) -> anyhow::Result<Url> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("{path:?} is not valid UTF-8"))?;
        if !path.starts_with('/') {
            bail!("{path:?} is not an absolute path");
        }
        let mut url = self.base.clone();
        url.set_path(&format!("{API_PREFIX}{path}"));
        url.query_pairs_mut()
            .append_pair("op", op)
            .append_pair("user.name", &self.user)
            .extend_pairs(params);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &Path,
        op: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, FsError> {
        let url = self.url(path, op, params)?;
        tracing::trace!("{method} {url}");
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .with_context(|| format!("{op} request for {path:?} failed"))?;
        if wants_negotiate(&response) {
            return Err(FsError::Other(self.negotiate_required(path).into()));
        }
        check(response, path).await
    }

    /// Check that the namenode answers and is not in standby
    pub async fn probe(&self) -> Result<(), FsError> {
        self.stat(Path::new("/")).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl FileSystem for WebHdfs {
    #[instrument(skip(self))]
    async fn stat(&self, path: &Path) -> Result<FileStatus, FsError> {
        let response = self.send(Method::GET, path, "GETFILESTATUS", &[]).await?;
        let status: StatusResponse = parse_json(response, path).await?;
        Ok(status.file_status.into_status(path))
    }

    #[instrument(skip(self))]
    async fn list(&self, path: &Path) -> Result<Vec<FileStatus>, FsError> {
        let response = self.send(Method::GET, path, "LISTSTATUS", &[]).await?;
        let listing: ListResponse = parse_json(response, path).await?;
        Ok(listing
            .file_statuses
            .file_status
            .into_iter()
            .map(|status| status.into_status(path))
            .collect())
    }

    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<FileReader, FsError> {
        let mut response = self.send(Method::GET, path, "OPEN", &[]).await?;
        if response.status().is_redirection() {
            let datanode = location(&response)?;
            tracing::debug!("reading from {datanode}");
            response = self
                .client
                .get(datanode)
                .send()
                .await
                .with_context(|| format!("failed reading {path:?} from datanode"))?;
            response = check(response, path).await?;
        }
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(tokio_util::io::StreamReader::new(Box::pin(stream))))
    }

    #[instrument(skip(self))]
    async fn create(&self, path: &Path) -> Result<FileWriter, FsError> {
        // overwrite=false guards against races, the stat spares streaming data just to be refused
        if self.stat(path).await.is_ok() {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }
        let response = self
            .send(Method::PUT, path, "CREATE", &[("overwrite", "false")])
            .await?;
        if !response.status().is_redirection() {
            return Err(FsError::Other(anyhow!(
                "namenode did not redirect the creation of {path:?} ({})",
                response.status()
            )));
        }
        let datanode = location(&response)?;
        tracing::debug!("writing to {datanode}");
        let (pipe, body) = tokio::io::duplex(UPLOAD_BUFFER_SIZE);
        let request = self
            .client
            .put(datanode)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(
                body,
            )));
        let target = path.to_path_buf();
        let upload = tokio::spawn(async move {
            let response = request
                .send()
                .await
                .with_context(|| format!("failed writing {target:?} to datanode"))?;
            check(response, &target).await?;
            Ok::<(), FsError>(())
        });
        Ok(Box::new(UploadWriter {
            pipe,
            upload,
            finished: false,
        }))
    }

    #[instrument(skip(self))]
    async fn mkdir(&self, path: &Path, mode: u32) -> Result<(), FsError> {
        // MKDIRS succeeds on existing directories, the capability reports them instead
        if self.stat(path).await.is_ok() {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }
        let permission = format!("{mode:o}");
        let response = self
            .send(Method::PUT, path, "MKDIRS", &[("permission", permission.as_str())])
            .await?;
        let created: BooleanResponse = parse_json(response, path).await?;
        if !created.boolean {
            return Err(FsError::Other(anyhow!("namenode refused to create {path:?}")));
        }
        Ok(())
    }
}

/// Feeds written bytes to the datanode upload running in the background
struct UploadWriter {
    pipe: tokio::io::DuplexStream,
    upload: tokio::task::JoinHandle<Result<(), FsError>>,
    finished: bool,
}

impl AsyncWrite for UploadWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.pipe).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.pipe).poll_flush(cx)
    }

    // closes the body and waits for the datanode to acknowledge the upload
    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Ok(()));
        }
        ready!(Pin::new(&mut this.pipe).poll_shutdown(cx))?;
        let result = ready!(Pin::new(&mut this.upload).poll(cx));
        this.finished = true;
        match result {
            Ok(Ok(())) => Poll::Ready(Ok(())),
            Ok(Err(error)) => Poll::Ready(Err(std::io::Error::other(error))),
            Err(error) => Poll::Ready(Err(std::io::Error::other(error))),
        }
    }
}

/// Builds [`WebHdfs`] sessions, failing over between the configured namenodes
#[derive(Debug, Default, Clone, Copy)]
pub struct WebHdfsConnector;

impl WebHdfsConnector {
    fn base_url(address: &str, use_https: bool) -> anyhow::Result<Url> {
        let url = if address.contains("://") {
            address.to_string()
        } else if use_https {
            format!("https://{address}")
        } else {
            format!("http://{address}")
        };
        Url::parse(&url).with_context(|| format!("invalid namenode address {address:?}"))
    }
}

#[async_trait::async_trait]
impl Connector for WebHdfsConnector {
    async fn connect(&self, options: &ClientOptions) -> anyhow::Result<ClientSession> {
        if options.addresses.is_empty() {
            bail!(
                "no namenode address configured, set {} or provide the cluster configuration",
                crate::session::NAMENODE_ENV
            );
        }
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(options.dial_timeout)
            .tcp_keepalive(options.keep_alive)
            .build()
            .context("failed to build the http client")?;
        let mut failures = Vec::new();
        for address in &options.addresses {
            let fs = WebHdfs::new(
                client.clone(),
                Self::base_url(address, options.use_https)?,
                options.user.clone(),
            )
            .with_kerberos(options.kerberos.clone());
            match fs.probe().await {
                Ok(()) => {
                    tracing::info!("using namenode {address}");
                    return Ok(Arc::new(fs));
                }
                // every namenode of the cluster asks the same
                Err(FsError::Other(error)) if error.is::<NegotiateRequired>() => {
                    return Err(error);
                }
                Err(error) => {
                    tracing::debug!("namenode {address} is not usable: {error:#}");
                    failures.push(format!("{address}: {error:#}"));
                }
            }
        }
        Err(anyhow!("no usable namenode ({})", failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn webhdfs() -> WebHdfs {
        WebHdfs::new(
            reqwest::Client::new(),
            Url::parse("http://nn:9870").unwrap(),
            "alice",
        )
    }

    fn webhdfs_at(address: &str) -> WebHdfs {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        WebHdfs::new(
            client,
            WebHdfsConnector::base_url(address, false).unwrap(),
            "alice",
        )
    }

    struct Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    }

    impl Reply {
        fn new(status: u16, body: &str) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }
        }

        fn redirect(location: String) -> Self {
            Self {
                status: 307,
                headers: vec![("Location", location)],
                body: String::new(),
            }
        }
    }

    struct Request {
        head: String,
        body: Vec<u8>,
    }

    fn dechunk(mut data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(end) = data.windows(2).position(|window| window == b"\r\n") {
            let size = std::str::from_utf8(&data[..end]).unwrap().trim();
            let size = usize::from_str_radix(size, 16).unwrap();
            if size == 0 {
                break;
            }
            body.extend_from_slice(&data[end + 2..end + 2 + size]);
            data = &data[end + 4 + size..];
        }
        body
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> Request {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        let head_end = loop {
            if let Some(end) = data.windows(4).position(|window| window == b"\r\n\r\n") {
                break end + 4;
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break data.len();
            }
            data.extend_from_slice(&buf[..n]);
        };
        let head = String::from_utf8_lossy(&data[..head_end]).to_string();
        let lowercase = head.to_ascii_lowercase();
        let mut body = data[head_end..].to_vec();
        let chunked = lowercase.contains("transfer-encoding: chunked");
        let length = lowercase
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map_or(0, |value| value.trim().parse().unwrap());
        loop {
            let complete = if chunked {
                body.ends_with(b"0\r\n\r\n")
            } else {
                body.len() >= length
            };
            if complete {
                break;
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }
        if chunked {
            body = dechunk(&body);
        }
        Request { head, body }
    }

    /// Answer each incoming connection with the next reply, the handle yields what was received
    async fn serve(replies: Vec<Reply>) -> (String, tokio::task::JoinHandle<Vec<Request>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for reply in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                let mut response = format!("HTTP/1.1 {} X\r\n", reply.status);
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str(&format!(
                    "Content-Type: application/json\r\nContent-Length: {}\r\n\
                     Connection: close\r\n\r\n{}",
                    reply.body.len(),
                    reply.body
                ));
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });
        (address, handle)
    }

    const ROOT_STATUS: &str = r#"{"FileStatus":{"pathSuffix":"","type":"DIRECTORY","length":0}}"#;
    const FILE_STATUS: &str = r#"{"FileStatus":{"pathSuffix":"","type":"FILE","length":3}}"#;
    const NOT_FOUND: &str =
        r#"{"RemoteException":{"exception":"FileNotFoundException","message":"File does not exist"}}"#;

    #[test]
    fn builds_operation_urls() -> anyhow::Result<()> {
        let url = webhdfs().url(Path::new("/user/alice/a b.txt"), "OPEN", &[("offset", "0")])?;
        assert_eq!(
            url.as_str(),
            "http://nn:9870/webhdfs/v1/user/alice/a%20b.txt?op=OPEN&user.name=alice&offset=0"
        );
        assert!(webhdfs().url(Path::new("relative"), "OPEN", &[]).is_err());
        Ok(())
    }

    #[test]
    fn maps_remote_exceptions() {
        let path = Path::new("/a");
        let body = br#"{"RemoteException":{"exception":"FileNotFoundException","javaClassName":"java.io.FileNotFoundException","message":"File does not exist: /a"}}"#;
        assert!(matches!(
            remote_error(StatusCode::NOT_FOUND, body, path),
            FsError::NotFound(_)
        ));
        let body = br#"{"RemoteException":{"exception":"FileAlreadyExistsException","message":"/a exists"}}"#;
        assert!(matches!(
            remote_error(StatusCode::FORBIDDEN, body, path),
            FsError::AlreadyExists(_)
        ));
        let body = br#"{"RemoteException":{"exception":"StandbyException","message":"Operation category READ is not supported in state standby"}}"#;
        let error = remote_error(StatusCode::FORBIDDEN, body, path);
        assert!(error.to_string().contains("StandbyException"), "{error}");
        assert!(matches!(
            remote_error(StatusCode::NOT_FOUND, b"<html>", path),
            FsError::NotFound(_)
        ));
        assert!(matches!(
            remote_error(StatusCode::BAD_GATEWAY, b"<html>", path),
            FsError::Other(_)
        ));
    }

    #[test]
    fn parses_listing() -> anyhow::Result<()> {
        let body = r#"{"FileStatuses":{"FileStatus":[
            {"accessTime":0,"pathSuffix":"sub","type":"DIRECTORY","length":0,"owner":"alice"},
            {"accessTime":1,"pathSuffix":"x.txt","type":"FILE","length":24930,"owner":"alice"}
        ]}}"#;
        let listing: ListResponse = serde_json::from_str(body)?;
        let statuses: Vec<_> = listing
            .file_statuses
            .file_status
            .into_iter()
            .map(|status| status.into_status(Path::new("/a")))
            .collect();
        assert_eq!(
            statuses,
            vec![
                FileStatus {
                    path: "/a/sub".into(),
                    is_dir: true,
                    length: 0
                },
                FileStatus {
                    path: "/a/x.txt".into(),
                    is_dir: false,
                    length: 24930
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn base_urls() -> anyhow::Result<()> {
        assert_eq!(
            WebHdfsConnector::base_url("nn:9870", false)?.as_str(),
            "http://nn:9870/"
        );
        assert_eq!(
            WebHdfsConnector::base_url("nn:9871", true)?.as_str(),
            "https://nn:9871/"
        );
        assert_eq!(
            WebHdfsConnector::base_url("http://nn:50070", true)?.as_str(),
            "http://nn:50070/"
        );
        Ok(())
    }

    #[tokio::test]
    async fn no_addresses_is_an_error() {
        let options = ClientOptions::new("alice", Vec::new());
        let Err(error) = WebHdfsConnector.connect(&options).await else {
            panic!("connected without any namenode address");
        };
        assert!(error.to_string().contains("HADOOP_NAMENODE"), "{error}");
    }

    #[tokio::test]
    async fn fails_over_to_active_namenode() -> anyhow::Result<()> {
        let (standby, _) = serve(vec![Reply::new(
            403,
            r#"{"RemoteException":{"exception":"StandbyException","message":"standby"}}"#,
        )])
        .await;
        let (active, _) = serve(vec![
            Reply::new(200, ROOT_STATUS),
            Reply::new(200, FILE_STATUS),
        ])
        .await;
        let options = ClientOptions::new(
            "alice",
            vec!["127.0.0.1:1".to_string(), standby, active],
        );
        let session = WebHdfsConnector.connect(&options).await?;
        let status = session.stat(Path::new("/a/x.txt")).await?;
        assert_eq!(
            status,
            FileStatus {
                path: "/a/x.txt".into(),
                is_dir: false,
                length: 3
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_namenodes_fail() {
        let options = ClientOptions::new("alice", vec!["127.0.0.1:1".to_string()]);
        let Err(error) = WebHdfsConnector.connect(&options).await else {
            panic!("connected to an unreachable namenode");
        };
        assert!(error.to_string().contains("no usable namenode"), "{error}");
    }

    #[tokio::test]
    async fn spnego_challenge_names_the_login() {
        let mut challenge = Reply::new(401, "");
        challenge
            .headers
            .push(("WWW-Authenticate", "Negotiate".to_string()));
        let (secured, _) = serve(vec![challenge]).await;
        let (other, _) = serve(vec![Reply::new(200, ROOT_STATUS)]).await;
        let mut options = ClientOptions::new("alice", vec![secured, other]);
        options.kerberos = Some(KerberosCredential {
            principal: "alice@EXAMPLE.COM".to_string(),
            keytab_path: "/conf/user.keytab".into(),
            krb5_conf: "/conf/krb5.conf".into(),
            ticket_cache: "/tmp/rhdfs_krb5cc_1000".into(),
        });
        let Err(error) = WebHdfsConnector.connect(&options).await else {
            panic!("connected to a namenode demanding SPNEGO");
        };
        assert!(error.is::<NegotiateRequired>(), "{error:#}");
        let message = error.to_string();
        assert!(message.contains("SPNEGO"), "{message}");
        assert!(message.contains("logged in as alice@EXAMPLE.COM"), "{message}");
    }

    #[tokio::test]
    async fn open_follows_datanode_redirect() -> anyhow::Result<()> {
        let (datanode, datanode_requests) = serve(vec![Reply::new(200, "payload bytes")]).await;
        let (namenode, namenode_requests) = serve(vec![Reply::redirect(format!(
            "http://{datanode}/webhdfs/v1/a/x.txt?op=OPEN&namenoderpcaddress=nn:8020"
        ))])
        .await;
        let mut reader = webhdfs_at(&namenode).open(Path::new("/a/x.txt")).await?;
        let mut data = String::new();
        reader.read_to_string(&mut data).await?;
        assert_eq!(data, "payload bytes");
        let namenode_requests = namenode_requests.await?;
        assert!(
            namenode_requests[0]
                .head
                .starts_with("GET /webhdfs/v1/a/x.txt?op=OPEN&user.name=alice "),
            "{}",
            namenode_requests[0].head
        );
        let datanode_requests = datanode_requests.await?;
        assert!(
            datanode_requests[0]
                .head
                .starts_with("GET /webhdfs/v1/a/x.txt?op=OPEN&namenoderpcaddress=nn:8020 "),
            "{}",
            datanode_requests[0].head
        );
        Ok(())
    }

    #[tokio::test]
    async fn create_streams_the_upload_to_the_datanode() -> anyhow::Result<()> {
        let (datanode, datanode_requests) = serve(vec![Reply::new(201, "")]).await;
        let (namenode, namenode_requests) = serve(vec![
            Reply::new(404, NOT_FOUND),
            Reply::redirect(format!("http://{datanode}/webhdfs/v1/a/new.txt?op=CREATE")),
        ])
        .await;
        let mut writer = webhdfs_at(&namenode).create(Path::new("/a/new.txt")).await?;
        writer.write_all(b"hello ").await?;
        writer.write_all(b"world").await?;
        writer.shutdown().await?;
        let namenode_requests = namenode_requests.await?;
        assert!(namenode_requests[0].head.contains("op=GETFILESTATUS"));
        assert!(
            namenode_requests[1].head.starts_with(
                "PUT /webhdfs/v1/a/new.txt?op=CREATE&user.name=alice&overwrite=false "
            ),
            "{}",
            namenode_requests[1].head
        );
        let datanode_requests = datanode_requests.await?;
        assert!(datanode_requests[0].head.starts_with("PUT /webhdfs/v1/a/new.txt?op=CREATE "));
        assert_eq!(datanode_requests[0].body, b"hello world");
        Ok(())
    }

    #[tokio::test]
    async fn create_refuses_existing_file() -> anyhow::Result<()> {
        let (namenode, namenode_requests) = serve(vec![Reply::new(200, FILE_STATUS)]).await;
        let result = webhdfs_at(&namenode).create(Path::new("/a/x.txt")).await;
        assert!(matches!(result, Err(FsError::AlreadyExists(_))));
        assert_eq!(namenode_requests.await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_upload_surfaces_on_shutdown() -> anyhow::Result<()> {
        let (datanode, _) = serve(vec![Reply::new(
            403,
            r#"{"RemoteException":{"exception":"AccessControlException","message":"Permission denied"}}"#,
        )])
        .await;
        let (namenode, _) = serve(vec![
            Reply::new(404, NOT_FOUND),
            Reply::redirect(format!("http://{datanode}/webhdfs/v1/a/new.txt?op=CREATE")),
        ])
        .await;
        let mut writer = webhdfs_at(&namenode).create(Path::new("/a/new.txt")).await?;
        writer.write_all(b"data").await?;
        let error = writer.shutdown().await.unwrap_err();
        assert!(error.to_string().contains("AccessControlException"), "{error}");
        Ok(())
    }

    #[tokio::test]
    async fn mkdir_creates_missing_directory() -> anyhow::Result<()> {
        let (namenode, namenode_requests) = serve(vec![
            Reply::new(404, NOT_FOUND),
            Reply::new(200, r#"{"boolean":true}"#),
        ])
        .await;
        webhdfs_at(&namenode).mkdir(Path::new("/a/sub"), 0o755).await?;
        let namenode_requests = namenode_requests.await?;
        assert!(
            namenode_requests[1]
                .head
                .starts_with("PUT /webhdfs/v1/a/sub?op=MKDIRS&user.name=alice&permission=755 "),
            "{}",
            namenode_requests[1].head
        );
        Ok(())
    }

    #[tokio::test]
    async fn mkdir_reports_existing_directory() -> anyhow::Result<()> {
        let (namenode, namenode_requests) = serve(vec![Reply::new(200, ROOT_STATUS)]).await;
        let result = webhdfs_at(&namenode).mkdir(Path::new("/a"), 0o755).await;
        assert!(matches!(result, Err(FsError::AlreadyExists(_))));
        assert_eq!(namenode_requests.await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn mkdir_refusal_is_an_error() {
        let (namenode, _) = serve(vec![
            Reply::new(404, NOT_FOUND),
            Reply::new(200, r#"{"boolean":false}"#),
        ])
        .await;
        let result = webhdfs_at(&namenode).mkdir(Path::new("/a"), 0o755).await;
        assert!(matches!(result, Err(FsError::Other(_))));
    }
}
