#![allow(dead_code)]

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use iclr_points::{AreaTaxonomy, EngineOptions, FacultyRegistry, IclrEngine};
use tempfile::TempDir;

pub const FACULTY_CSV: &str = "\
name,affiliation,homepage,scholarid
Alice,MIT,http://alice.example,NOSCHOLARPAGE
Bob,CMU,http://bob.example,NOSCHOLARPAGE
";

pub const TAXONOMY_CSV: &str = "\
parent_area,area,abbreviation,conference
AI,Machine learning,iclr,ICLR
Systems,Security,usenixsec,USENIX Security
";

/// Three classified papers over 2020-2021 plus records that must not count:
/// a journal article, a paper without a year, an unclassified venue, and a
/// 2019 Security paper by a non-faculty author.
pub const DUMP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE dblp SYSTEM "dblp.dtd">
<dblp>
<inproceedings key="conf/iclr/A20" mdate="2020-05-01">
<author>Alice</author>
<title>Learning things.</title>
<year>2020</year>
<booktitle>ICLR 2020</booktitle>
</inproceedings>
<inproceedings key="conf/uss/AB20" mdate="2020-08-01">
<author>Alice</author>
<author>Bob</author>
<title>Securing things.</title>
<year>2020</year>
<booktitle>USENIX Security Symposium</booktitle>
</inproceedings>
<inproceedings key="conf/iclr/B21" mdate="2021-05-01">
<author>Bob</author>
<title>Learning more things.</title>
<year>2021</year>
<booktitle>ICLR 2021</booktitle>
</inproceedings>
<article key="journals/jmlr/A20" mdate="2020-01-01">
<author>Alice</author>
<title>A journal paper.</title>
<year>2020</year>
<journal>JMLR</journal>
</article>
<inproceedings key="conf/iclr/noyear" mdate="2020-01-01">
<author>Bob</author>
<title>Undated.</title>
<booktitle>ICLR</booktitle>
</inproceedings>
<inproceedings key="conf/sosp/A20" mdate="2020-10-01">
<author>Alice</author>
<title>Operating things.</title>
<year>2020</year>
<booktitle>SOSP</booktitle>
</inproceedings>
<inproceedings key="conf/uss/C19" mdate="2019-08-01">
<author>Carol</author>
<title>Older security.</title>
<year>2019</year>
<booktitle>USENIX Security Symposium</booktitle>
</inproceedings>
</dblp>
"#;

pub struct Fixture {
    pub dir: TempDir,
    pub faculty: PathBuf,
    pub taxonomy: PathBuf,
    pub dblp: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_dump(DUMP_XML)
    }

    /// Same roster and taxonomy, with `xml` written gzipped as the dump.
    pub fn with_dump(xml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let faculty = dir.path().join("faculty.csv");
        let taxonomy = dir.path().join("area.csv");
        let dblp = dir.path().join("dblp.xml.gz");
        fs::write(&faculty, FACULTY_CSV).unwrap();
        fs::write(&taxonomy, TAXONOMY_CSV).unwrap();
        write_gz(&dblp, xml.as_bytes());
        Self {
            dir,
            faculty,
            taxonomy,
            dblp,
        }
    }

    pub fn engine(&self) -> IclrEngine {
        self.engine_with(EngineOptions::default())
    }

    pub fn engine_with(&self, options: EngineOptions) -> IclrEngine {
        IclrEngine::new(
            FacultyRegistry::load(&self.faculty).unwrap(),
            AreaTaxonomy::load(&self.taxonomy).unwrap(),
            &self.dblp,
            options,
        )
    }
}

pub fn write_gz(path: &Path, bytes: &[u8]) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap();
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
