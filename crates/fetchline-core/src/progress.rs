//! Transfer progress reporting.
//!
//! A single [`TransferProgress`] type is used for both directions, so one
//! callback can observe an upload followed by the download of the response.

/// Which way the bytes are flowing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Request body being sent.
    Upload,
    /// Response body being received.
    Download,
}

/// Progress information for an upload or download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    /// Direction of the transfer.
    pub direction: TransferDirection,
    /// Number of bytes transferred so far.
    pub bytes_transferred: u64,
    /// Total number of bytes, if known.
    pub total_bytes: Option<u64>,
    /// Size of the chunk that produced this event.
    pub chunk_bytes: u64,
}

impl TransferProgress {
    /// Create an upload progress event.
    pub fn upload(bytes_transferred: u64, total_bytes: Option<u64>, chunk_bytes: u64) -> Self {
        Self {
            direction: TransferDirection::Upload,
            bytes_transferred,
            total_bytes,
            chunk_bytes,
        }
    }

    /// Create a download progress event.
    pub fn download(bytes_transferred: u64, total_bytes: Option<u64>, chunk_bytes: u64) -> Self {
        Self {
            direction: TransferDirection::Download,
            bytes_transferred,
            total_bytes,
            chunk_bytes,
        }
    }

    /// Check if this is an upload event.
    pub fn is_upload(&self) -> bool {
        self.direction == TransferDirection::Upload
    }

    /// Check if this is a download event.
    pub fn is_download(&self) -> bool {
        self.direction == TransferDirection::Download
    }

    /// Get the progress as a fraction (0.0 to 1.0), if total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                1.0
            } else {
                self.bytes_transferred as f64 / total as f64
            }
        })
    }

    /// Get the progress as a percentage (0 to 100), if total is known.
    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0).min(100.0) as u8)
    }

    /// Check if every expected byte has been transferred.
    pub fn is_complete(&self) -> bool {
        self.total_bytes
            .is_some_and(|total| self.bytes_transferred >= total)
    }
}
