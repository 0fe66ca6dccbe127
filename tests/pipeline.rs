use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use zip::write::SimpleFileOptions;

use kira_reference_ingest::config::{
    BoldRequest, EmblRequest, MitofishRequest, NcbiRequest, SourceRequest,
};
use kira_reference_ingest::domain::PagePolicy;
use kira_reference_ingest::download::Downloader;
use kira_reference_ingest::error::KiraError;
use kira_reference_ingest::fasta;
use kira_reference_ingest::ncbi::{EntrezClient, WebSession};
use kira_reference_ingest::pipeline::{MITOFISH_ENTRY, Pipeline, ProgressEvent, ProgressSink};

#[derive(Default)]
struct MockEntrez {
    records: Vec<(String, String)>,
}

impl EntrezClient for MockEntrez {
    fn search(&self, _query: &str, database: &str) -> Result<WebSession, KiraError> {
        let ids = (0..self.records.len()).map(|n| n.to_string()).collect();
        WebSession::new(database, self.records.len(), ids, "MCID_mock", "1")
    }

    fn fetch_page(
        &self,
        _session: &WebSession,
        start: usize,
        size: usize,
    ) -> Result<String, KiraError> {
        Ok(self
            .records
            .iter()
            .skip(start)
            .take(size)
            .map(|(header, residues)| format!(">{header}\n{residues}\n"))
            .collect())
    }
}

/// Serves fixed bodies by URL; anything else is a 404.
#[derive(Default)]
struct MockDownloader {
    bodies: HashMap<String, Vec<u8>>,
    listings: HashMap<String, Vec<String>>,
}

impl MockDownloader {
    fn with_body(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    fn with_listing(mut self, url: &str, links: &[&str]) -> Self {
        self.listings
            .insert(url.to_string(), links.iter().map(|l| l.to_string()).collect());
        self
    }
}

impl Downloader for MockDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<(), KiraError> {
        let body = self.bodies.get(url).ok_or_else(|| KiraError::DownloadStatus {
            status: 404,
            message: url.to_string(),
        })?;
        fs::write(destination, body).map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    fn list_links(&self, url: &str) -> Result<Vec<String>, KiraError> {
        Ok(self.listings.get(url).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct Harness {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Harness {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self { _temp: temp, root }
    }

    fn work(&self) -> Utf8PathBuf {
        self.root.join("work")
    }

    fn output(&self) -> Utf8PathBuf {
        self.root.join("out").join("refs.fasta")
    }
}

fn read(path: &Utf8Path) -> String {
    fs::read_to_string(path.as_std_path()).unwrap()
}

fn ids(path: &Utf8Path) -> Vec<String> {
    fasta::read_records(path.as_std_path())
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect()
}

fn assert_work_dir_empty(work: &Utf8Path) {
    let leftovers = fs::read_dir(work.as_std_path()).unwrap().count();
    assert_eq!(leftovers, 0, "intermediate files left in {work}");
}

#[test]
fn ncbi_end_to_end() {
    let harness = Harness::new();
    let entrez = MockEntrez {
        records: vec![
            ("MN000001.1 Gadus morhua 12S".to_string(), "ACGT".to_string()),
            ("MN000002.1 Salmo salar 12S".to_string(), "GGCC".to_string()),
            ("MN000003.1 Salmo trutta 12S".to_string(), "TTAA".to_string()),
        ],
    };
    let pipeline = Pipeline::new(entrez, MockDownloader::default())
        .with_work_root(Some(harness.work()))
        .with_backoff(Duration::from_millis(0));
    let request = SourceRequest::Ncbi(NcbiRequest {
        query: "12S[All Fields]".to_string(),
        database: "nucleotide".to_string(),
        email: "lab@example.org".to_string(),
        api_key: None,
        batch_size: 2,
        page_policy: PagePolicy::Strict,
    });
    let sink = RecordingSink::default();

    let result = pipeline.ingest(&request, &harness.output(), &sink).unwrap();

    assert_eq!(result.source, "ncbi");
    assert_eq!(result.accepted, 3);
    assert_eq!(result.discarded, 0);
    assert_eq!(result.expected, Some(3));
    assert_eq!(result.fetched, Some(3));
    assert!(result.failed_pages.is_empty());
    assert_eq!(
        read(&harness.output()),
        ">MN000001\nACGT\n>MN000002\nGGCC\n>MN000003\nTTAA\n"
    );
    assert_eq!(
        read(Utf8Path::new(&result.table_output)),
        "MN000001\tMN000001.1 Gadus morhua 12S\n\
         MN000002\tMN000002.1 Salmo salar 12S\n\
         MN000003\tMN000003.1 Salmo trutta 12S\n"
    );
    assert_work_dir_empty(&harness.work());

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|m| m == "phase=Download; page 2/2"));
    assert!(messages.iter().any(|m| m.starts_with("phase=Done")));
}

#[test]
fn mitofish_end_to_end() {
    let harness = Harness::new();
    let mut archive = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut archive));
        zip.start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"MitoFish bundle").unwrap();
        zip.start_file(
            format!("download/{MITOFISH_ENTRY}"),
            SimpleFileOptions::default(),
        )
        .unwrap();
        zip.write_all(
            concat!(
                ">gb|NC_002333|Danio rerio\nACGT\n",
                ">gi|123456|gb|AB123456.1|\nGGCC\n",
                ">gb|AP011111|Oryzias latipes\nTTTT\n",
            )
            .as_bytes(),
        )
        .unwrap();
        zip.finish().unwrap();
    }
    let url = "https://mitofish.example/bundle.zip";
    let downloader = MockDownloader::default().with_body(url, archive);
    let pipeline = Pipeline::new(MockEntrez::default(), downloader)
        .with_work_root(Some(harness.work()));
    let request = SourceRequest::Mitofish(MitofishRequest {
        url: url.to_string(),
    });

    let result = pipeline
        .ingest(&request, &harness.output(), &RecordingSink::default())
        .unwrap();

    assert_eq!(result.accepted, 2);
    assert_eq!(result.discarded, 1);
    assert_eq!(result.expected, None);
    assert_eq!(ids(&harness.output()), vec!["NC_002333", "AP011111"]);
    assert_eq!(
        read(Utf8Path::new(&result.discarded_output)),
        ">gi|123456|gb|AB123456.1|\nGGCC\n"
    );
    assert_work_dir_empty(&harness.work());
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn embl_end_to_end() {
    let harness = Harness::new();
    let release = "https://ebi.example/release/std/";
    let downloader = MockDownloader::default()
        .with_listing(
            release,
            &[
                "../",
                "rel_std_mam_02_r143.dat.gz",
                "rel_std_mam_01_r143.dat.gz",
                "rel_std_hum_01_r143.dat.gz",
            ],
        )
        .with_body(
            &format!("{release}rel_std_mam_01_r143.dat.gz"),
            gzip(concat!(
                "ID   X56734; SV 1; linear; mRNA; STD; MAM; 12 BP.\n",
                "AC   X56734;\n",
                "SQ   Sequence 12 BP;\n",
                "     acgtacgtac gg                                                 12\n",
                "//\n",
            )),
        )
        .with_body(
            &format!("{release}rel_std_mam_02_r143.dat.gz"),
            gzip(concat!(
                "ID   Y00001; SV 1; linear; DNA; STD; MAM; 4 BP.\n",
                "AC   Y00001; Y00002;\n",
                "SQ   Sequence 4 BP;\n",
                "     tttt                                                           4\n",
                "//\n",
            )),
        );
    let pipeline = Pipeline::new(MockEntrez::default(), downloader)
        .with_work_root(Some(harness.work()));
    let request = SourceRequest::Embl(EmblRequest {
        release_url: release.to_string(),
        division: "mam*".to_string(),
    });

    let result = pipeline
        .ingest(&request, &harness.output(), &RecordingSink::default())
        .unwrap();

    assert_eq!(result.accepted, 2);
    assert_eq!(read(&harness.output()), ">X56734\nACGTACGTACGG\n>Y00001\nTTTT\n");
    assert_work_dir_empty(&harness.work());
}

#[test]
fn embl_without_matching_files() {
    let harness = Harness::new();
    let release = "https://ebi.example/release/std/";
    let downloader =
        MockDownloader::default().with_listing(release, &["rel_std_hum_01_r143.dat.gz"]);
    let pipeline = Pipeline::new(MockEntrez::default(), downloader)
        .with_work_root(Some(harness.work()));
    let request = SourceRequest::Embl(EmblRequest {
        release_url: release.to_string(),
        division: "mam".to_string(),
    });

    let result = pipeline.ingest(&request, &harness.output(), &RecordingSink::default());
    assert_matches!(result, Err(KiraError::NoReleaseFiles(prefix)) if prefix == "rel_std_mam");
}

#[test]
fn bold_end_to_end() {
    let harness = Harness::new();
    let mut body = Vec::new();
    body.extend_from_slice(b">ABC001-10|Salmo trutta|COI-5P|KF123456.1\nACGT\n");
    body.extend_from_slice(b">ABC002-10|Salmo M");
    body.push(0xFC);
    body.extend_from_slice(b"ller|COI-5P\nGGCC\n");
    body.extend_from_slice(b">ABC003-10|Salmo salar|COI-5P|KF000003-SUPPRESSED\nTTTT\n");
    let request = BoldRequest {
        url: "https://bold.example/sequence".to_string(),
        taxon: "Salmo".to_string(),
    };
    let downloader = MockDownloader::default().with_body(&request.query_url(), body);
    let pipeline = Pipeline::new(MockEntrez::default(), downloader)
        .with_work_root(Some(harness.work()));

    let result = pipeline
        .ingest(
            &SourceRequest::Bold(request),
            &harness.output(),
            &RecordingSink::default(),
        )
        .unwrap();

    assert_eq!(result.accepted, 2);
    assert_eq!(result.discarded, 1);
    assert_eq!(result.suppressed, 1);
    assert_eq!(
        read(&harness.output()),
        ">KF123456\nACGT\n>CRABS:Salmo Müller\nGGCC\n"
    );
    assert_work_dir_empty(&harness.work());
}

#[test]
fn failed_download_reported() {
    let harness = Harness::new();
    let pipeline = Pipeline::new(MockEntrez::default(), MockDownloader::default())
        .with_work_root(Some(harness.work()));
    let request = SourceRequest::Mitofish(MitofishRequest {
        url: "https://mitofish.example/missing.zip".to_string(),
    });

    let result = pipeline.ingest(&request, &harness.output(), &RecordingSink::default());
    assert_matches!(result, Err(KiraError::DownloadStatus { status: 404, .. }));
    assert!(!harness.output().exists());
}
