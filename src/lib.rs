//! This is an API client library for interacting with MEGA's API using Rust.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use futures::AsyncSeek;
use url::Url;

use crate::attributes::NodeAttributes;
use crate::commands::{FileNode, Request, Response};
use crate::pipeline::{Pipeline, Priority};

pub use crate::commands::NodeKind;
pub use crate::config::{ClientConfig, ProxyConfig, RetryConfig, TimeoutConfig, TlsConfig, TransportConfig, UploadConfig};
pub use crate::error::{Error, ErrorCode, ErrorKind, Result};
pub use crate::http::{ClientState, HttpClient, UserSession};
pub use crate::download::{MAX_SECTION_SIZE, MIN_SECTION_SIZE};
pub use crate::keys::ShareKeyEntry;
pub use crate::attributes::{MediaCodecTable, MediaInfo};
pub use crate::session::{InMemorySessionStore, SessionSnapshot, SessionStore};
pub use crate::tree::{Node, Nodes};
pub use crate::upload::ProgressCallback;
pub use crate::utils::StorageQuotas;

mod attributes;
mod commands;
mod config;
mod crypto;
mod download;
mod error;
mod http;
mod import;
mod keys;
mod pipeline;
mod session;
mod tree;
mod upload;
mod utils;

pub(crate) const DEFAULT_API_ORIGIN: &str = "https://g.api.mega.co.nz/";

/// A builder to initialize a [`Client`] instance.
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a default [`ClientBuilder`].
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Sets the API's origin.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.config.transport.origin = origin.into();
        self
    }

    /// Sets the maximum amount of retries.
    pub fn max_retries(mut self, amount: u32) -> Self {
        self.config.retry.max_retries = amount;
        self
    }

    /// Sets the minimum delay duration between retries.
    pub fn min_retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.min_retry_delay = delay;
        self
    }

    /// Sets the maximum delay duration between retries.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.max_retry_delay = delay;
        self
    }

    /// Sets the timeout duration to use for each command request.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeouts.command = duration;
        self
    }

    /// Sets whether to use HTTPS for file uploads and downloads, instead of plain HTTP.
    pub fn https(mut self, value: bool) -> Self {
        self.config.transport.force_https_transfers = value;
        self
    }

    /// Replaces the whole configuration at once, for host applications that
    /// load it from a file rather than building it up field by field.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds a [`Client`] instance with the current settings and the specified HTTP client.
    pub fn build<T: HttpClient + 'static>(self, client: T) -> Result<Client> {
        let origin = Url::parse(&self.config.transport.origin)?;

        let state = ClientState {
            origin,
            max_retries: self.config.retry.max_retries as usize,
            min_retry_delay: self.config.retry.min_retry_delay,
            max_retry_delay: self.config.retry.max_retry_delay,
            timeout: Some(self.config.timeouts.command),
            https: self.config.transport.force_https_transfers,
            id_counter: AtomicU64::new(0),
            session: None,
        };

        let pipeline = Pipeline::new(Box::new(client), state);

        Ok(Client {
            pipeline,
            config: self.config,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The MEGA API Client itself.
pub struct Client {
    pipeline: Pipeline,
    config: ClientConfig,
}

impl Client {
    /// Creates a builder to initialize a [`Client`] instance.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Returns the configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn current_session(&self) -> Result<UserSession> {
        self.pipeline
            .state()
            .await
            .session
            .clone()
            .ok_or_else(|| Error::Other("not logged in".into()))
    }

    /// Authenticates this session with MEGA.
    pub async fn login(&self, email: &str, password: &str, mfa: Option<&str>) -> Result<()> {
        let session = session::login(&self.pipeline, email, password, mfa).await?;
        self.pipeline.state().await.session = Some(session);
        Ok(())
    }

    /// Restores a previously persisted session without going through the
    /// login ceremony again.
    pub async fn restore_session(&self, snapshot: &SessionSnapshot) {
        self.pipeline.state().await.session = Some(UserSession {
            sid: snapshot.session_id.clone(),
            key: snapshot.master_key,
            user_id: snapshot.user_id.clone(),
            user_name: snapshot.user_name.clone(),
            private_key: snapshot.private_key.clone(),
        });
    }

    /// Loads a session from `store` and restores it, if one is present.
    pub async fn login_from_store(&self, store: &dyn SessionStore) -> Result<bool> {
        match store.load().await? {
            Some(snapshot) => {
                self.restore_session(&snapshot).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshots the current session for persistence via a [`SessionStore`].
    /// Returns `None` if this client isn't currently authenticated.
    ///
    /// `created_at` is carried over from `previous` when given (a prior
    /// snapshot being refreshed); otherwise it's stamped with the current
    /// time, as it would be for a brand new session. `updated_at` always
    /// reflects the moment of this call.
    pub async fn session_snapshot(&self, email: &str, previous: Option<&SessionSnapshot>) -> Option<SessionSnapshot> {
        let state = self.pipeline.state().await;
        let now = chrono::Utc::now();
        state.session.as_ref().map(|session| SessionSnapshot {
            email: email.to_string(),
            user_id: session.user_id.clone(),
            user_name: session.user_name.clone(),
            session_id: session.sid.clone(),
            master_key: session.key,
            private_key: session.private_key.clone(),
            created_at: previous.map_or(now, |p| p.created_at),
            updated_at: now,
        })
    }

    /// Logs out of the current session with MEGA.
    pub async fn logout(&self) -> Result<()> {
        let response = self.pipeline.submit(Request::Logout {}, Priority::Immediate).await?;

        match response {
            Response::Error(ErrorCode::OK) => {
                self.pipeline.state().await.session = None;
                Ok(())
            }
            Response::Error(code) => Err(Error::from(code)),
            _ => Err(Error::InvalidResponseType),
        }
    }

    /// Logs out and erases the persisted session from `store`.
    pub async fn logout_with_store(&self, store: &dyn SessionStore) -> Result<()> {
        self.logout().await?;
        store.delete().await
    }

    /// Fetches all nodes from the user's own MEGA account.
    pub async fn fetch_own_nodes(&self) -> Result<Nodes> {
        let request = Request::FetchNodes { c: 1, r: None };
        let response = self.pipeline.submit(request, Priority::Batched).await?;

        let response = match response {
            Response::FetchNodes(response) => response,
            Response::Error(code) => return Err(Error::from(code)),
            _ => return Err(Error::InvalidResponseType),
        };

        let session = self.current_session().await?;

        let own_entries: Option<Vec<keys::ShareKeyEntry>> =
            response.ok.as_deref().map(|entries| entries.iter().map(Into::into).collect());
        let own0_entries: Option<Vec<keys::ShareKeyEntry>> =
            response.ok0.as_deref().map(|entries| entries.iter().map(Into::into).collect());
        let share_keys = keys::build_share_keys(own_entries.as_deref(), own0_entries.as_deref(), &session.key)?;
        let share_roots: std::collections::HashSet<String> = share_keys.keys().cloned().collect();

        let mut nodes = HashMap::<String, Node>::new();
        for file in &response.nodes {
            let node = match file.kind {
                NodeKind::Unknown => continue,
                NodeKind::Root | NodeKind::Inbox | NodeKind::Trash => {
                    Node::placeholder(file.hash.clone(), file.kind, file.ts, None)
                }
                _ => {
                    let resolved = file
                        .key
                        .as_deref()
                        .and_then(|raw_k| keys::resolve_node_key(raw_k, &session.user_id, &session.key, &share_keys).ok());
                    node_from_resolved(file, resolved, None)
                }
            };
            nodes.insert(node.hash().to_string(), node);
        }

        Ok(Nodes::build_with_share_roots(nodes, &share_roots))
    }

    /// Fetches all nodes from a public MEGA link.
    ///
    /// Supported URL formats:
    /// - `https://mega.nz/file/{node_id}#{node_key}`
    /// - `https://mega.nz/folder/{node_id}#{node_key}`
    pub async fn fetch_public_nodes(&self, url: &str) -> Result<Nodes> {
        let shared_url = Url::parse(url)?;
        let (node_kind, node_id) = {
            let segments: Vec<&str> = shared_url.path().split('/').skip(1).collect();
            match segments.as_slice() {
                ["file", file_id] => (NodeKind::File, file_id.to_string()),
                ["folder", folder_id] => (NodeKind::Folder, folder_id.to_string()),
                _ => return Err(Error::Other("unrecognized public link format".into())),
            }
        };

        let node_key = {
            let fragment = shared_url
                .fragment()
                .ok_or_else(|| Error::Other("public link is missing its key fragment".into()))?;
            let key = fragment.split_once('/').map_or(fragment, |(key, _)| key);
            crypto::base64url_decode(key)?
        };

        let mut nodes = HashMap::<String, Node>::new();

        match node_kind {
            NodeKind::File => {
                let request = Request::Download {
                    g: 1,
                    ssl: 0,
                    p: Some(node_id.clone()),
                    n: None,
                };
                let response = self
                    .pipeline
                    .send_immediate_with_params(std::slice::from_ref(&request), &[("n", node_id.as_str())])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(Error::InvalidResponseType)?;

                let file = match response {
                    Response::Download(file) => file,
                    Response::Error(code) => return Err(Error::from(code)),
                    _ => return Err(Error::InvalidResponseType),
                };

                let attr_key = attribute_key_for(&node_key);
                let attrs = NodeAttributes::decrypt_and_unpack(&attr_key, &file.attr)?;

                let node = Node::file_from_public_link(node_id.clone(), file.size, node_key, attrs);
                nodes.insert(node.hash().to_string(), node);

                Ok(Nodes::build(nodes))
            }
            NodeKind::Folder => {
                let request = Request::FetchNodes { c: 1, r: Some(1) };
                let response = self
                    .pipeline
                    .send_immediate_with_params(std::slice::from_ref(&request), &[("n", node_id.as_str())])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(Error::InvalidResponseType)?;

                let response = match response {
                    Response::FetchNodes(response) => response,
                    Response::Error(code) => return Err(Error::from(code)),
                    _ => return Err(Error::InvalidResponseType),
                };

                let folder_key: [u8; 16] = node_key[..16].try_into().map_err(|_| Error::InvalidResponseFormat)?;

                for file in &response.nodes {
                    let node = match file.kind {
                        NodeKind::Unknown => continue,
                        NodeKind::Root | NodeKind::Inbox | NodeKind::Trash => {
                            Node::placeholder(file.hash.clone(), file.kind, file.ts, None)
                        }
                        _ => {
                            let resolved = file
                                .key
                                .as_deref()
                                .and_then(|raw_k| decrypt_public_node_key(raw_k, &folder_key).ok());
                            node_from_resolved(file, resolved, Some(node_id.as_str()))
                        }
                    };
                    nodes.insert(node.hash().to_string(), node);
                }

                Ok(Nodes::build(nodes))
            }
            _ => unreachable!(),
        }
    }

    /// Returns the status of the current storage quotas.
    pub async fn get_storage_quotas(&self) -> Result<StorageQuotas> {
        let request = Request::Quota { xfer: 1, strg: 1 };
        let response = self.pipeline.submit(request, Priority::Batched).await?;

        let quota = match response {
            Response::Quota(quota) => quota,
            Response::Error(code) => return Err(Error::from(code)),
            _ => return Err(Error::InvalidResponseType),
        };

        Ok(StorageQuotas {
            memory_used: quota.cstrg,
            memory_total: quota.mstrg,
        })
    }

    /// Fetches the media container/codec id-to-string lookup table used to
    /// resolve a [`MediaInfo`]'s codec ids into names.
    pub async fn fetch_media_codec_table(&self) -> Result<MediaCodecTable> {
        let request = Request::MediaCodecs {};
        let response = self.pipeline.submit(request, Priority::Batched).await?;

        match response {
            Response::MediaCodecs(response) => Ok(response.into()),
            Response::Error(code) => Err(Error::from(code)),
            _ => Err(Error::InvalidResponseType),
        }
    }

    /// Downloads a file, identified by its node, into the given writer,
    /// verifying its meta-MAC once every chunk has landed.
    pub async fn download_node<W>(&self, node: &Node, writer: W) -> Result<()>
    where
        W: AsyncWrite + AsyncSeek + Unpin,
    {
        download::download_node(
            &self.pipeline,
            self.config.transport.force_https_transfers,
            node,
            writer,
            self.config.upload.max_concurrent_uploads,
        )
        .await
    }

    /// Uploads a file within a parent folder, returning the new node's handle.
    pub async fn upload_node<R: AsyncRead>(&self, parent: &Node, name: &str, size: u64, reader: R) -> Result<String> {
        let session = self.current_session().await?;
        upload::upload_node(
            &self.pipeline,
            &session,
            self.config.transport.force_https_transfers,
            parent.hash(),
            name,
            size,
            reader,
            None,
            None,
        )
        .await
    }

    /// Like [`Client::upload_node`], but reports progress after each chunk.
    pub async fn upload_node_with_progress<R: AsyncRead>(
        &self,
        parent: &Node,
        name: &str,
        size: u64,
        reader: R,
        progress: &dyn ProgressCallback,
    ) -> Result<String> {
        let session = self.current_session().await?;
        upload::upload_node(
            &self.pipeline,
            &session,
            self.config.transport.force_https_transfers,
            parent.hash(),
            name,
            size,
            reader,
            None,
            Some(progress),
        )
        .await
    }

    /// Uploads a new version of `previous`, keeping it around as an older
    /// version rather than deleting it (MEGA's `ov` mechanism).
    pub async fn replace_node<R: AsyncRead>(&self, parent: &Node, previous: &Node, name: &str, size: u64, reader: R) -> Result<String> {
        let session = self.current_session().await?;
        upload::upload_node(
            &self.pipeline,
            &session,
            self.config.transport.force_https_transfers,
            parent.hash(),
            name,
            size,
            reader,
            Some(previous.hash()),
            None,
        )
        .await
    }

    /// Downloads the node's attribute payload into the given writer, if it exists.
    async fn download_attribute<W: AsyncWrite + Unpin>(&self, kind: AttributeKind, attr_handle: &str, node: &Node, mut writer: W) -> Result<()> {
        let request = Request::UploadFileAttributes {
            h: None,
            fah: Some(attr_handle.to_string()),
            s: None,
            ssl: if self.config.transport.force_https_transfers { 2 } else { 0 },
            r: Some(1),
        };
        let response = self.pipeline.submit(request, Priority::Batched).await?;
        let response = match response {
            Response::UploadFileAttributes(response) => response,
            Response::Error(code) => return Err(Error::from(code)),
            _ => return Err(Error::InvalidResponseType),
        };

        let attr_handle_bytes = crypto::base64url_decode(attr_handle)?;
        let body_len = attr_handle_bytes.len() as u64;
        let body = futures::io::Cursor::new(attr_handle_bytes);

        let url = Url::parse(&format!("{}/{}", response.p, kind as u8))?;
        let mut reader = self.pipeline.post(url, Box::pin(body), Some(body_len)).await?;

        // the response is framed as an 8-byte echoed id, a 4-byte
        // little-endian payload length, then the payload itself.
        let mut header = [0u8; 12];
        reader.read_exact(&mut header).await?;
        let payload_len = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).await?;

        let attr_key = attribute_key_for(node.key());
        let padding_len = (16 - payload.len() % 16) % 16;
        payload.extend(std::iter::repeat(0u8).take(padding_len));
        crypto::aes_cbc_zero_iv_decrypt_in_place(&attr_key, &mut payload);
        payload.truncate(payload_len);

        writer.write_all(&payload).await?;
        Ok(())
    }

    /// Downloads the node's thumbnail image into the given writer, if it exists.
    pub async fn download_thumbnail<W: AsyncWrite + Unpin>(&self, node: &Node, writer: W) -> Result<()> {
        let attr_handle = node.thumbnail_handle().ok_or(Error::NodeAttributeNotFound)?;
        self.download_attribute(AttributeKind::Thumbnail, attr_handle, node, writer).await
    }

    /// Downloads the node's preview image into the given writer, if it exists.
    pub async fn download_preview_image<W: AsyncWrite + Unpin>(&self, node: &Node, writer: W) -> Result<()> {
        let attr_handle = node.preview_image_handle().ok_or(Error::NodeAttributeNotFound)?;
        self.download_attribute(AttributeKind::PreviewImage, attr_handle, node, writer).await
    }

    /// Uploads an attribute's payload for an existing node from a given reader.
    async fn upload_attribute<R: AsyncRead>(&self, kind: AttributeKind, node: &Node, size: u64, reader: R) -> Result<()> {
        let request = Request::UploadFileAttributes {
            h: Some(node.hash().to_string()),
            fah: None,
            s: Some(size),
            ssl: if self.config.transport.force_https_transfers { 2 } else { 0 },
            r: None,
        };
        let response = self.pipeline.submit(request, Priority::Batched).await?;
        let response = match response {
            Response::UploadFileAttributes(response) => response,
            Response::Error(code) => return Err(Error::from(code)),
            _ => return Err(Error::InvalidResponseType),
        };

        let mut payload = Vec::new();
        {
            let reader = reader.take(size);
            futures::pin_mut!(reader);
            reader.read_to_end(&mut payload).await?;
        }

        let attr_key = attribute_key_for(node.key());
        let padding_len = (16 - payload.len() % 16) % 16;
        payload.extend(std::iter::repeat(0u8).take(padding_len));
        crypto::aes_cbc_zero_iv_encrypt_in_place(&attr_key, &mut payload);

        let url = Url::parse(&format!("{}/{}", response.p, kind as u8))?;
        let body_len = payload.len() as u64;
        let body = futures::io::Cursor::new(payload);
        let mut reader = self.pipeline.post(url, Box::pin(body), Some(body_len)).await?;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        let fah = crypto::base64url_encode(&buffer);

        let request = Request::PutFileAttributes {
            n: node.hash().to_string(),
            fa: format!("{}*{fah}", kind as u8),
        };
        match self.pipeline.submit(request, Priority::Batched).await? {
            Response::PutFileAttributes(_) => Ok(()),
            Response::Error(code) => Err(Error::from(code)),
            _ => Err(Error::InvalidResponseType),
        }
    }

    /// Uploads a thumbnail image for an existing node from a given reader.
    /// A no-op error if disabled via `UploadConfig::auto_thumbnail`.
    pub async fn upload_thumbnail<R: AsyncRead>(&self, node: &Node, size: u64, reader: R) -> Result<()> {
        if !self.config.upload.auto_thumbnail {
            return Err(Error::Other("thumbnail uploads are disabled (UploadConfig::auto_thumbnail)".into()));
        }
        self.upload_attribute(AttributeKind::Thumbnail, node, size, reader).await
    }

    /// Uploads a preview image for an existing node from a given reader.
    /// A no-op error if disabled via `UploadConfig::auto_preview`.
    pub async fn upload_preview_image<R: AsyncRead>(&self, node: &Node, size: u64, reader: R) -> Result<()> {
        if !self.config.upload.auto_preview {
            return Err(Error::Other("preview-image uploads are disabled (UploadConfig::auto_preview)".into()));
        }
        self.upload_attribute(AttributeKind::PreviewImage, node, size, reader).await
    }

    /// The configured timestamp an external video probe should sample a
    /// frame from when producing thumbnail/preview source pixels for this
    /// client, per `UploadConfig::video_frame_time`.
    pub fn video_frame_time(&self) -> std::time::Duration {
        self.config.upload.video_frame_time
    }

    /// Creates a new, empty directory.
    pub async fn create_dir(&self, parent: &Node, name: &str) -> Result<String> {
        let session = self.current_session().await?;
        upload::create_dir(&self.pipeline, &session, parent.hash(), name).await
    }

    /// Imports a subtree reached through a public link (a folder or a lone
    /// file) into `target_parent`, returning the new root's handle.
    pub async fn import_folder(&self, nodes: &Nodes, root: &Node, target_parent: &Node) -> Result<String> {
        let session = self.current_session().await?;
        import::import_subtree(&self.pipeline, &session, nodes, root, target_parent.hash()).await
    }

    /// Renames a node.
    pub async fn rename_node(&self, node: &Node, name: &str) -> Result<()> {
        let attr_key = attribute_key_for(node.key());
        let attrs = node.attributes().cloned().unwrap_or_default();
        let attrs = NodeAttributes {
            name: name.to_string(),
            ..attrs
        };

        let attr_buffer = attrs.pack_and_encrypt(&attr_key)?;
        let attr_b64 = BASE64_URL_SAFE_NO_PAD.encode(attr_buffer);

        let request = Request::SetFileAttributes {
            n: node.hash().to_string(),
            key: None,
            attr: attr_b64,
            i: utils::random_string(10),
        };

        match self.pipeline.submit(request, Priority::Batched).await? {
            Response::Error(ErrorCode::OK) => Ok(()),
            Response::SetFileAttributes(_) => Ok(()),
            Response::Error(code) => Err(Error::from(code)),
            _ => Err(Error::InvalidResponseType),
        }
    }

    /// Moves a node to a different folder.
    pub async fn move_node(&self, node: &Node, parent: &Node) -> Result<()> {
        let request = Request::Move {
            n: node.hash().to_string(),
            t: parent.hash().to_string(),
            i: utils::random_string(10),
        };

        match self.pipeline.submit(request, Priority::Batched).await? {
            Response::Error(ErrorCode::OK) => Ok(()),
            Response::Move(_) => Ok(()),
            Response::Error(code) => Err(Error::from(code)),
            _ => Err(Error::InvalidResponseType),
        }
    }

    /// Deletes a node.
    pub async fn delete_node(&self, node: &Node) -> Result<()> {
        let request = Request::Delete {
            n: node.hash().to_string(),
            i: utils::random_string(10),
        };

        match self.pipeline.submit(request, Priority::Batched).await? {
            Response::Error(ErrorCode::OK) => Ok(()),
            Response::Delete(_) => Ok(()),
            Response::Error(code) => Err(Error::from(code)),
            _ => Err(Error::InvalidResponseType),
        }
    }
}

/// Derives the key that attribute en/decryption actually uses from a
/// resolved node key: a 32-byte file key carries a nonce and meta-MAC after
/// its first 16 bytes and must be un-merged first; a 16-byte folder key has
/// neither and is used as-is.
fn attribute_key_for(node_key: &[u8]) -> Vec<u8> {
    if node_key.len() == 32 {
        let mut unmerged = node_key.to_vec();
        crypto::xor_halves_in_place(&mut unmerged);
        unmerged[..16].to_vec()
    } else {
        node_key.to_vec()
    }
}

/// Builds a [`Node`] from a fetched [`FileNode`] and its already-resolved
/// key (`None` when the key couldn't be decrypted against any known
/// user/share key).
fn node_from_resolved(file: &FileNode, resolved_key: Option<Vec<u8>>, download_id: Option<&str>) -> Node {
    let (thumbnail_handle, preview_image_handle) = file.file_attr.as_deref().map(parse_file_attr_handles).unwrap_or((None, None));
    let parent = (!file.parent.is_empty()).then(|| file.parent.clone());
    let created_at = Utc.timestamp_opt(file.ts as i64, 0).single();

    let Some(node_key) = resolved_key else {
        return Node::undecryptable(file.hash.clone(), file.sz.unwrap_or(0), file.kind, parent, created_at, download_id, thumbnail_handle, preview_image_handle);
    };

    let attr_key = attribute_key_for(&node_key);
    match NodeAttributes::decrypt_and_unpack(&attr_key, &file.attr) {
        Ok(attrs) => Node::decrypted(
            file.hash.clone(),
            file.sz.unwrap_or(0),
            file.kind,
            parent,
            node_key,
            attrs,
            created_at,
            download_id,
            thumbnail_handle,
            preview_image_handle,
        ),
        Err(_) => Node::undecryptable(file.hash.clone(), file.sz.unwrap_or(0), file.kind, parent, created_at, download_id, thumbnail_handle, preview_image_handle),
    }
}

/// Decrypts a node key from a public folder link: unlike an own-account
/// fetch, every node's `k` pair is addressed by the folder's own handle and
/// encrypted under the folder key, so there's no user/share lookup to do.
fn decrypt_public_node_key(raw_k: &str, folder_key: &[u8; 16]) -> Result<Vec<u8>> {
    let (_, enc_k) = raw_k.split_once(':').ok_or(Error::InvalidResponseFormat)?;
    let mut decoded = crypto::base64url_decode(enc_k)?;
    if decoded.len() % 16 != 0 {
        return Err(Error::InvalidResponseFormat);
    }
    crypto::aes_ecb_decrypt_in_place(folder_key, &mut decoded);
    Ok(decoded)
}

/// Parses a node's `fa` field (`id1:0*handle1/id2:1*handle2...`) into its
/// thumbnail and preview-image attribute handles.
fn parse_file_attr_handles(file_attr: &str) -> (Option<String>, Option<String>) {
    let mut thumbnail_handle = None;
    let mut preview_image_handle = None;

    let entries = file_attr.split('/').filter_map(|it| it.split_once(':')?.1.split_once('*'));
    for (key, val) in entries {
        match key {
            "0" => thumbnail_handle = Some(val.to_string()),
            "1" => preview_image_handle = Some(val.to_string()),
            _ => {}
        }
    }

    (thumbnail_handle, preview_image_handle)
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum AttributeKind {
    Thumbnail = 0,
    PreviewImage = 1,
}
