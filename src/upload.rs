//! Upload engine (C6): encrypts a file's bytes under AES-CTR while
//! computing its chunk-wise CBC-MAC, streams the ciphertext to the upload
//! URL, then completes the node with its encrypted attributes and key.
//! Factored out of `lib.rs`'s public API so `import.rs`'s node creation can
//! drive the same key-wrapping and attribute-encryption path.

use base64::prelude::{Engine, BASE64_URL_SAFE_NO_PAD};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use url::Url;

use crate::attributes::NodeAttributes;
use crate::commands::{NodeKind, Request, Response, UploadAttributes};
use crate::crypto::{self, FileCipher};
use crate::error::{Error, Result};
use crate::http::UserSession;
use crate::pipeline::{Pipeline, Priority};

/// Upload chunk sizes start at 128 KiB and grow by 128 KiB per chunk up to
/// a 1 MiB ceiling, matching the progression MEGA's own clients use so
/// that small files don't pay for an oversized first request.
const CHUNK_SIZE_START: usize = 128 * 1024;
const CHUNK_SIZE_STEP: usize = 128 * 1024;
const CHUNK_SIZE_CEILING: usize = 1024 * 1024;

/// An iterator over the ascending chunk-size progression used when
/// splitting a file for the MAC/encrypt pass; stops growing once it hits
/// the ceiling and continues yielding ceiling-sized chunks indefinitely
/// (the caller reads until EOF regardless of how many chunks that is).
pub(crate) struct ChunkSizes {
    next: usize,
}

impl ChunkSizes {
    pub(crate) fn new() -> Self {
        Self {
            next: CHUNK_SIZE_START,
        }
    }
}

impl Iterator for ChunkSizes {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next;
        if self.next < CHUNK_SIZE_CEILING {
            self.next = (self.next + CHUNK_SIZE_STEP).min(CHUNK_SIZE_CEILING);
        }
        Some(current)
    }
}

/// Reports upload progress after each chunk is encrypted and queued for
/// transfer.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, bytes_sent: u64, total_bytes: u64);
}

impl<F: Fn(u64, u64) + Send + Sync> ProgressCallback for F {
    fn on_progress(&self, bytes_sent: u64, total_bytes: u64) {
        self(bytes_sent, total_bytes)
    }
}

/// Uploads `size` bytes read from `reader` into `parent`, naming the new
/// node `name`, optionally superseding `previous_version`'s handle. Returns
/// the handle of the newly created node.
pub async fn upload_node<R: AsyncRead>(
    pipeline: &Pipeline,
    session: &UserSession,
    https: bool,
    parent_hash: &str,
    name: &str,
    size: u64,
    reader: R,
    previous_version: Option<&str>,
    progress: Option<&(dyn ProgressCallback)>,
) -> Result<String> {
    let request = Request::Upload {
        s: size,
        ssl: if https { 2 } else { 0 },
    };
    let response = pipeline.submit(request, Priority::Batched).await?;
    let response = match response {
        Response::Upload(response) => response,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    let (file_key, nonce): ([u8; 16], [u8; 8]) = rand::random();
    let cipher = FileCipher::new(&file_key, &nonce);

    let (pipe_reader, mut pipe_writer) = sluice::pipe::pipe();

    let encrypt_and_mac = async move {
        let mut cipher = cipher;
        let mut chunk_sizes = ChunkSizes::new();
        let mut chunk_macs: Vec<[u8; 16]> = Vec::new();
        let mut bytes_sent: u64 = 0;

        let mut reader = reader.take(size);
        futures::pin_mut!(reader);

        let mut buffer = Vec::new();
        loop {
            let Some(chunk_size) = chunk_sizes.next() else {
                break;
            };

            buffer.clear();
            buffer.reserve(chunk_size);
            let bytes_read = (&mut reader).take(chunk_size as u64).read_to_end(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }

            let mac_iv = {
                let mut iv = [0u8; 16];
                iv[..8].copy_from_slice(&nonce);
                iv[8..].copy_from_slice(&nonce);
                iv
            };
            chunk_macs.push(crypto::cbc_mac(&file_key, &mac_iv, &buffer));

            cipher.apply(&mut buffer);
            pipe_writer.write_all(&buffer).await?;

            bytes_sent += bytes_read as u64;
            if let Some(progress) = progress {
                progress.on_progress(bytes_sent, size);
            }

            if bytes_read < chunk_size {
                break;
            }
        }

        Ok::<_, Error>(crypto::meta_mac_fold(&file_key, chunk_macs.iter()))
    };

    let url = Url::parse(&format!("{}/0", response.upload_url))?;
    let transfer = async {
        let mut reader = pipeline.post(url, Box::pin(pipe_reader), Some(size)).await?;
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Ok::<_, Error>(String::from_utf8_lossy(&buffer).into_owned())
    };

    let (meta_mac, completion_handle) = futures::try_join!(encrypt_and_mac, transfer)?;

    let attributes = NodeAttributes::named(name);
    let attr_buffer = attributes.pack_and_encrypt(&file_key)?;
    let attr_b64 = BASE64_URL_SAFE_NO_PAD.encode(attr_buffer);

    let mut key = [0u8; 32];
    key[..16].copy_from_slice(&file_key);
    key[16..24].copy_from_slice(&nonce);
    key[24..].copy_from_slice(&meta_mac);
    crypto::xor_halves_in_place(&mut key);
    crypto::aes_ecb_encrypt_in_place(&session.key, &mut key);
    let key_b64 = BASE64_URL_SAFE_NO_PAD.encode(key);

    let attrs = UploadAttributes {
        kind: NodeKind::File,
        key: key_b64,
        attr: attr_b64,
        completion_handle,
        file_attr: None,
        previous_version: previous_version.map(str::to_string),
    };

    let idempotence_id = crate::utils::random_string(10);
    let request = Request::UploadComplete {
        t: parent_hash.to_string(),
        n: [attrs],
        i: idempotence_id,
    };

    let response = pipeline.submit(request, Priority::Batched).await?;
    let created = match response {
        Response::UploadComplete(response) => response,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    created
        .f
        .first()
        .map(|node| node.hash.clone())
        .ok_or(Error::InvalidResponseFormat)
}

/// Creates a new, empty folder inside `parent`, returning its handle.
pub async fn create_dir(
    pipeline: &Pipeline,
    session: &UserSession,
    parent_hash: &str,
    name: &str,
) -> Result<String> {
    let folder_key: [u8; 16] = rand::random();

    let attributes = NodeAttributes::named(name);
    let attr_buffer = attributes.pack_and_encrypt(&folder_key)?;
    let attr_b64 = BASE64_URL_SAFE_NO_PAD.encode(attr_buffer);

    // Folder keys have no nonce/meta-MAC attached (there's no bulk data to
    // encrypt or MAC); the wire `k` is just the 16-byte key under AES-ECB.
    let mut key = folder_key;
    crypto::aes_ecb_encrypt_in_place(&session.key, &mut key);
    let key_b64 = BASE64_URL_SAFE_NO_PAD.encode(key);

    let attrs = UploadAttributes {
        kind: NodeKind::Folder,
        key: key_b64,
        attr: attr_b64,
        completion_handle: "xxxxxxxx".to_string(),
        file_attr: None,
        previous_version: None,
    };

    let idempotence_id = crate::utils::random_string(10);
    let request = Request::UploadComplete {
        t: parent_hash.to_string(),
        n: [attrs],
        i: idempotence_id,
    };

    let response = pipeline.submit(request, Priority::Batched).await?;
    let created = match response {
        Response::UploadComplete(response) => response,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    created
        .f
        .first()
        .map(|node| node.hash.clone())
        .ok_or(Error::InvalidResponseFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_sizes_ramp_up_then_plateau() {
        let sizes: Vec<usize> = ChunkSizes::new().take(10).collect();
        assert_eq!(
            sizes,
            vec![
                131_072, 262_144, 393_216, 524_288, 655_360, 786_432, 917_504, 1_048_576,
                1_048_576, 1_048_576,
            ]
        );
    }
}
