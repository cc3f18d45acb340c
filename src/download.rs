//! Download engine (C7): fetches a file's ciphertext in parallel chunks,
//! decrypts each under AES-CTR, and verifies the whole transfer against the
//! node's stored meta-MAC once every chunk has landed. Splits a file into
//! fixed-size sections and fetches them concurrently with `buffer_unordered`,
//! then adds the MAC verification a bare range-fetch wouldn't give you;
//! transfer state is kept in memory only, since nothing else in this crate
//! persists it across process runs.

use std::io::SeekFrom;

use futures::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use futures::{stream, StreamExt};
use url::Url;

use crate::commands::{Request, Response};
use crate::crypto::{self, FileCipher};
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, Priority};
use crate::tree::Node;

pub const MIN_SECTION_SIZE: usize = 1024 * 1024;
pub const MAX_SECTION_SIZE: usize = 1024 * 1024 * 128;

/// Splits `file_size` bytes into `(start, inclusive_end)` spans of
/// approximately `section_size` bytes each.
fn generate_sections(file_size: usize, section_size: usize) -> Vec<(usize, usize)> {
    let mut sections = Vec::new();
    for start in (0..file_size).step_by(section_size) {
        let end = (start + section_size - 1).min(file_size.saturating_sub(1));
        sections.push((start, end));
    }
    sections
}

fn generate_section_urls(base_url: &str, sections: &[(usize, usize)]) -> Result<Vec<(usize, usize, Url)>> {
    sections
        .iter()
        .map(|(start, end)| {
            let url = Url::parse(&format!("{base_url}/{start}-{end}"))?;
            Ok((*start, *end, url))
        })
        .collect()
}

/// Downloads `node`'s contents into `writer`, using up to `concurrency`
/// simultaneous section fetches, then verifies the reassembled plaintext's
/// meta-MAC against the one embedded in the node's key.
///
/// `download_id` is `Some(public_link_id)` when fetching through a public
/// link rather than the authenticated session.
pub async fn download_node<W>(
    pipeline: &Pipeline,
    https: bool,
    node: &Node,
    mut writer: W,
    concurrency: usize,
) -> Result<()>
where
    W: AsyncWrite + AsyncSeek + Unpin,
{
    let response = if let Some(download_id) = node.download_id() {
        // A node fetched through a public link needs the folder/file id
        // threaded through as a query parameter, not a JSON field, since
        // there's no session to scope the request to.
        let n = (node.hash() != download_id).then(|| node.hash().to_string());
        let request = Request::Download {
            g: 1,
            ssl: if https { 2 } else { 0 },
            n,
            p: Some(download_id.to_string()),
        };
        pipeline
            .send_immediate_with_params(std::slice::from_ref(&request), &[("n", download_id)])
            .await?
            .into_iter()
            .next()
            .ok_or(Error::InvalidResponseType)?
    } else {
        let request = Request::Download {
            g: 1,
            ssl: if https { 2 } else { 0 },
            n: Some(node.hash().to_string()),
            p: None,
        };
        pipeline.submit(request, Priority::Batched).await?
    };

    let response = match response {
        Response::Download(response) => response,
        Response::Error(code) => return Err(Error::from(code)),
        _ => return Err(Error::InvalidResponseType),
    };

    if node.key().len() != 32 {
        return Err(Error::InvalidResponseFormat);
    }
    // The nonce (bytes 16..24) and meta-MAC (bytes 24..32) sit past the
    // xor-folded half and are never touched by `xor_halves_in_place`, which
    // only merges bytes 0..16.
    let nonce: [u8; 8] = node.key()[16..24].try_into().unwrap();
    let expected_meta_mac: [u8; 8] = node.key()[24..32].try_into().unwrap();

    let mut raw_key = node.key().to_vec();
    crypto::xor_halves_in_place(&mut raw_key);
    let file_key: [u8; 16] = raw_key[..16].try_into().unwrap();

    let mac_iv = {
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&nonce);
        iv[8..].copy_from_slice(&nonce);
        iv
    };

    let file_size = response.size as usize;
    let section_size = (file_size / concurrency.max(1)).clamp(MIN_SECTION_SIZE, MAX_SECTION_SIZE);
    let sections = generate_sections(file_size, section_size);
    let urls = generate_section_urls(&response.download_url, &sections)?;

    let cipher = FileCipher::new(&file_key, &nonce);

    // Fetch and decrypt sections concurrently, but they must be MAC'd (and
    // written) in file order: collect decrypted sections keyed by start
    // offset, then process them in order once all arrive.
    let mut sections_out: Vec<(usize, Vec<u8>)> = stream::iter(urls)
        .map(|(start, _end, url)| {
            let cipher = cipher.clone();
            async move {
                let mut reader = pipeline.get(url).await?;
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await?;
                if buffer.is_empty() {
                    return Err(Error::InvalidResponseFormat);
                }

                let mut cipher = cipher;
                cipher.seek(start as u64);
                cipher.apply(&mut buffer);
                Ok::<_, Error>((start, buffer))
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    sections_out.sort_by_key(|(start, _)| *start);

    for (start, data) in &sections_out {
        writer.seek(SeekFrom::Start(*start as u64)).await?;
        writer.write_all(data).await?;
    }
    writer.flush().await?;

    // The MAC's chunk boundaries are independent of the download sections
    // above (they follow the same ascending progression the uploader used,
    // starting from byte 0 of the whole file), so MAC over the reassembled
    // plaintext rather than per-section.
    let plaintext: Vec<u8> = sections_out.into_iter().flat_map(|(_, data)| data).collect();
    let mut chunk_macs = Vec::new();
    let mut offset = 0usize;
    for chunk_size in crate::upload::ChunkSizes::new() {
        if offset >= plaintext.len() {
            break;
        }
        let end = (offset + chunk_size).min(plaintext.len());
        chunk_macs.push(crypto::cbc_mac(&file_key, &mac_iv, &plaintext[offset..end]));
        offset = end;
    }

    let computed_meta_mac = crypto::meta_mac_fold(&file_key, chunk_macs.iter());
    if !crypto::constant_time_eq(&computed_meta_mac, &expected_meta_mac) {
        return Err(Error::MacMismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_sections_covers_whole_file_without_overlap() {
        let sections = generate_sections(2_500_000, MIN_SECTION_SIZE);
        assert_eq!(sections.first(), Some(&(0, MIN_SECTION_SIZE - 1)));
        assert_eq!(sections.last().unwrap().1, 2_500_000 - 1);

        for pair in sections.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
    }

    #[test]
    fn generate_sections_handles_file_smaller_than_one_section() {
        let sections = generate_sections(100, MIN_SECTION_SIZE);
        assert_eq!(sections, vec![(0, 99)]);
    }

    /// Mirrors `upload.rs`'s wire-key packing (`key(16) || nonce(8) ||
    /// meta_mac(8)`, xor-folded over the first half only) and checks that
    /// unpacking recovers the original key, nonce, and meta-MAC untouched —
    /// in particular that the meta-MAC survives at bytes 24..32 and is not
    /// confused with the xor-folded bytes 8..16.
    #[test]
    fn key_unpacking_recovers_original_meta_mac_not_folded_bytes() {
        let file_key = [0xAAu8; 16];
        let nonce = [0xBBu8; 8];
        let meta_mac = [0xCCu8; 8];

        let mut wire_key = [0u8; 32];
        wire_key[..16].copy_from_slice(&file_key);
        wire_key[16..24].copy_from_slice(&nonce);
        wire_key[24..].copy_from_slice(&meta_mac);
        crypto::xor_halves_in_place(&mut wire_key);

        // bytes 8..16 are now `file_key[8..16] ^ nonce || meta_mac` folded
        // in; they must never be read back out as the meta-MAC.
        assert_ne!(&wire_key[8..16], &meta_mac);

        let recovered_nonce: [u8; 8] = wire_key[16..24].try_into().unwrap();
        let recovered_meta_mac: [u8; 8] = wire_key[24..32].try_into().unwrap();
        assert_eq!(recovered_nonce, nonce);
        assert_eq!(recovered_meta_mac, meta_mac);

        let mut unfolded = wire_key;
        crypto::xor_halves_in_place(&mut unfolded);
        let recovered_key: [u8; 16] = unfolded[..16].try_into().unwrap();
        assert_eq!(recovered_key, file_key);
    }
}
