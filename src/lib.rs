pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod extract;
pub mod fasta;
pub mod fetcher;
pub mod flatfile;
pub mod fs_util;
pub mod ncbi;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod transcode;
pub mod workspace;
