//! Symbol alias clustering.
//!
//! Names that appear at the same offset of the same pattern line are
//! interchangeable (the same routine exported under different names across
//! library builds). Clusters are the connected components of that relation,
//! computed with a union-find over interned names.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::LibraryKind;
use crate::patterns::{PatternError, PatternFile, PatternRecord};
use crate::store::write_atomic;

/// Ordering used to choose and present cluster members: shorter names first,
/// then by the case-swapped name (so lowercase sorts before uppercase).
pub fn alias_order(a: &str, b: &str) -> Ordering {
    a.chars()
        .count()
        .cmp(&b.chars().count())
        .then_with(|| swapcase(a).cmp(&swapcase(b)))
}

fn swapcase(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_uppercase() {
            out.extend(c.to_lowercase());
        } else if c.is_lowercase() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// An equivalence class of interchangeable symbol names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AliasCluster {
    /// Members in `alias_order`; the first one is canonical.
    members: Vec<String>,
}

impl AliasCluster {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut members: Vec<String> = names.into_iter().collect();
        members.sort_by(|a, b| alias_order(a, b));
        members.dedup();
        Self { members }
    }

    pub fn canonical(&self) -> &str {
        self.members.first().map(String::as_str).unwrap_or_default()
    }

    pub fn alternates(&self) -> &[String] {
        self.members.get(1..).unwrap_or_default()
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Table line: canonical name first, then alternates, comma separated.
    pub fn to_line(&self) -> String {
        self.members.join(",")
    }
}

#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Incrementally merges name sets into clusters.
#[derive(Debug, Default)]
pub struct AliasClusterer {
    index: HashMap<String, usize>,
    names: Vec<String>,
    sets: UnionFind,
}

impl AliasClusterer {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.sets.push();
        self.index.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Merge one set of names observed at a shared offset.
    pub fn add_names<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let mut first = None;
        for name in names {
            let id = self.intern(name);
            match first {
                Some(root) => self.sets.union(root, id),
                None => first = Some(id),
            }
        }
    }

    pub fn add_record(&mut self, record: &PatternRecord) {
        for names in record.entries.values() {
            self.add_names(names.iter().map(String::as_str));
        }
    }

    /// Connected components, sorted by member list.
    pub fn finish(mut self) -> Vec<AliasCluster> {
        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in 0..self.names.len() {
            let root = self.sets.find(id);
            groups.entry(root).or_default().push(std::mem::take(&mut self.names[id]));
        }
        let mut clusters: Vec<AliasCluster> = groups.into_values().map(AliasCluster::new).collect();
        clusters.sort();
        clusters
    }
}

/// Cluster every offset entry of `records`.
pub fn cluster<'a>(records: impl IntoIterator<Item = &'a PatternRecord>) -> Vec<AliasCluster> {
    let mut clusterer = AliasClusterer::new();
    for record in records {
        clusterer.add_record(record);
    }
    clusterer.finish()
}

/// Cluster the records of all `files`.
pub fn cluster_files(files: &[PatternFile]) -> Vec<AliasCluster> {
    cluster(files.iter().flat_map(|f| f.records.iter()))
}

/// Non-canonical names of the clusters built from one kind's pattern files.
pub fn suppression_names(files: &[PatternFile], kind: LibraryKind) -> BTreeSet<String> {
    let records = files
        .iter()
        .filter(|f| f.stem_starts_with(kind.prefix()))
        .flat_map(|f| f.records.iter());
    cluster(records).iter().flat_map(|c| c.alternates().iter().cloned()).collect()
}

/// Write the suppression list: one name per line, sorted.
pub fn write_suppression_list(path: &Path, names: &BTreeSet<String>) -> Result<(), PatternError> {
    let mut body = String::new();
    for name in names {
        body.push_str(name);
        body.push('\n');
    }
    write_atomic(path, body.as_bytes()).map_err(|e| PatternError::Io(path.to_path_buf(), e))
}

/// True if `output` is missing or older than the newest of `inputs`.
pub fn is_stale(output: &Path, inputs: &[PathBuf]) -> Result<bool, PatternError> {
    let modified = |path: &Path| {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| PatternError::Io(path.to_path_buf(), e))
    };
    let written = match fs::metadata(output) {
        Ok(_) => modified(output)?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(PatternError::Io(output.to_path_buf(), err)),
    };
    for input in inputs {
        if modified(input)? > written {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Name -> canonical name lookup built from clusters or an alias table file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    canonical: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn from_clusters(clusters: &[AliasCluster]) -> Self {
        let mut table = Self::default();
        for cluster in clusters {
            table.insert_line(cluster.members());
        }
        table
    }

    fn insert_line<S: AsRef<str>>(&mut self, members: &[S]) {
        let Some(canonical) = members.first() else {
            return;
        };
        for member in members {
            self.canonical.insert(member.as_ref().to_string(), canonical.as_ref().to_string());
        }
    }

    /// Render clusters in table format: one comma-separated line per cluster,
    /// ordered by member list.
    pub fn render(clusters: &[AliasCluster]) -> String {
        let mut sorted: Vec<&AliasCluster> = clusters.iter().collect();
        sorted.sort();
        let mut body = String::new();
        for cluster in sorted {
            body.push_str(&cluster.to_line());
            body.push('\n');
        }
        body
    }

    pub fn write(path: &Path, clusters: &[AliasCluster]) -> Result<(), PatternError> {
        write_atomic(path, Self::render(clusters).as_bytes())
            .map_err(|e| PatternError::Io(path.to_path_buf(), e))
    }

    pub fn parse(body: &str) -> Self {
        let mut table = Self::default();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let members: Vec<&str> = line.split(',').collect();
            table.insert_line(&members[..]);
        }
        table
    }

    /// Load a table file; a missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        match fs::read_to_string(path) {
            Ok(body) => Ok(Self::parse(&body)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(PatternError::Io(path.to_path_buf(), err)),
        }
    }

    /// Canonical name for `name`, if it belongs to a cluster.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.canonical.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}
