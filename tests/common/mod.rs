#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use kb_sync::error::RemoteError;
use kb_sync::kb_config::KnowledgeBaseConfig;
use kb_sync::models::{LocalFileRef, ProcessingStatus, RemoteFileSet, RemoteKnowledgeBase};
use kb_sync::pipeline::PollPolicy;
use kb_sync::remote::RemoteService;

/// In-memory remote service.
///
/// Files become visible in a knowledge base's inventory only once attached.
/// Processing status is scripted per filename; the last scripted status
/// repeats, and an unscripted file completes on the first poll.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    kbs: Vec<RemoteKnowledgeBase>,
    attached: HashMap<String, BTreeSet<String>>,
    uploads: HashMap<String, String>,
    created: Vec<KnowledgeBaseConfig>,
    status_script: HashMap<String, VecDeque<ProcessingStatus>>,
    polls: HashMap<String, usize>,
    fail_upload: HashSet<String>,
    fail_status: HashSet<String>,
    fail_attach: HashSet<String>,
    fail_inventory: HashSet<String>,
    calls: Vec<String>,
    next_id: usize,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

fn server_error(what: &str) -> RemoteError {
    RemoteError::Status {
        url: format!("fake://{}", what),
        status: 500,
        body: "injected failure".to_string(),
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing knowledge base and return its id.
    pub fn add_kb(&self, name: &str, files: &[&str]) -> String {
        let mut s = self.state.lock().unwrap();
        let id = s.next_id("kb");
        s.kbs.push(RemoteKnowledgeBase {
            id: id.clone(),
            name: name.to_string(),
        });
        s.attached
            .insert(id.clone(), files.iter().map(|f| f.to_string()).collect());
        id
    }

    pub fn script_status(&self, file: &str, statuses: &[ProcessingStatus]) {
        self.state
            .lock()
            .unwrap()
            .status_script
            .insert(file.to_string(), statuses.iter().copied().collect());
    }

    pub fn fail_upload(&self, file: &str) {
        self.state.lock().unwrap().fail_upload.insert(file.to_string());
    }

    pub fn fail_status(&self, file: &str) {
        self.state.lock().unwrap().fail_status.insert(file.to_string());
    }

    pub fn fail_attach(&self, file: &str) {
        self.state.lock().unwrap().fail_attach.insert(file.to_string());
    }

    pub fn fail_inventory(&self, kb_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_inventory
            .insert(kb_id.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls whose log entry starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn polls(&self, file: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .polls
            .get(file)
            .copied()
            .unwrap_or(0)
    }

    pub fn attached(&self, kb_id: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .unwrap()
            .attached
            .get(kb_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn created(&self) -> Vec<KnowledgeBaseConfig> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn kb_id(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .kbs
            .iter()
            .find(|kb| kb.name == name)
            .map(|kb| kb.id.clone())
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn list_knowledge_bases(&self) -> Result<Vec<RemoteKnowledgeBase>, RemoteError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push("list_kbs".to_string());
        Ok(s.kbs.clone())
    }

    async fn create_knowledge_base(
        &self,
        config: &KnowledgeBaseConfig,
    ) -> Result<String, RemoteError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("create:{}", config.name));
        if s.kbs.iter().any(|kb| kb.name == config.name) {
            return Err(RemoteError::AlreadyExists(config.name.clone()));
        }
        let id = s.next_id("kb");
        s.kbs.push(RemoteKnowledgeBase {
            id: id.clone(),
            name: config.name.clone(),
        });
        s.attached.insert(id.clone(), BTreeSet::new());
        s.created.push(config.clone());
        Ok(id)
    }

    async fn list_files(&self, kb_id: &str) -> Result<RemoteFileSet, RemoteError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("list_files:{}", kb_id));
        if s.fail_inventory.contains(kb_id) {
            return Err(server_error("inventory"));
        }
        Ok(s.attached.get(kb_id).cloned().unwrap_or_default())
    }

    async fn upload_file(&self, file: &LocalFileRef) -> Result<String, RemoteError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("upload:{}", file.name));
        if s.fail_upload.contains(&file.name) {
            return Err(server_error("upload"));
        }
        let id = s.next_id("file");
        s.uploads.insert(id.clone(), file.name.clone());
        Ok(id)
    }

    async fn file_status(&self, file_id: &str) -> Result<ProcessingStatus, RemoteError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("status:{}", file_id));
        let name = s.uploads.get(file_id).cloned().unwrap_or_default();
        *s.polls.entry(name.clone()).or_default() += 1;

        if s.fail_status.contains(&name) {
            return Err(server_error("status"));
        }
        let status = match s.status_script.get_mut(&name) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        Ok(status.unwrap_or(ProcessingStatus::Completed))
    }

    async fn attach_file(&self, kb_id: &str, file_id: &str) -> Result<(), RemoteError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("attach:{}:{}", kb_id, file_id));
        let name = s.uploads.get(file_id).cloned().unwrap_or_default();
        if s.fail_attach.contains(&name) {
            return Err(server_error("attach"));
        }
        s.attached.entry(kb_id.to_string()).or_default().insert(name);
        Ok(())
    }
}

/// Poll policy that does not slow tests down.
pub fn fast_poll(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        max_attempts,
    }
}

pub fn file_ref(name: &str) -> LocalFileRef {
    LocalFileRef {
        name: name.to_string(),
        path: Path::new("/kb").join(name),
    }
}

/// Create `<root>/<folder>` with a `kbconfig.yaml` and the given files.
pub fn make_folder(root: &Path, folder: &str, kbconfig: &str, files: &[&str]) {
    let dir = root.join(folder);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("kbconfig.yaml"), kbconfig).unwrap();
    for f in files {
        fs::write(dir.join(f), format!("contents of {}", f)).unwrap();
    }
}
