//! Test-only helpers: a throwaway git repository and a scripted review API.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::error::{Result, ReviewError};
use crate::io::api::ReviewApi;

/// A real `git init` repository in a temporary directory.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().map_err(|err| ReviewError::io("create tempdir", err))?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.email", "review@example.test"])?;
        repo.git(&["config", "user.name", "Review Test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ReviewError::io(format!("create {}", parent.display()), err))?;
        }
        fs::write(&path, contents)
            .map_err(|err| ReviewError::io(format!("write {}", path.display()), err))?;
        Ok(path)
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path)
            .map_err(|err| ReviewError::io(format!("read {}", path.display()), err))
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Run git in the repository and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .map_err(|err| ReviewError::io(format!("spawn git {}", args.join(" ")), err))?;
        if !output.status.success() {
            return Err(ReviewError::Git {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Canned `get_response` payload with the given status and optional text.
pub fn response_payload(id: &str, status: &str, text: Option<&str>) -> Value {
    let output = match text {
        Some(text) => json!([
            {
                "type": "message",
                "content": [{"type": "output_text", "text": text}],
            }
        ]),
        None => json!([]),
    };
    json!({"id": id, "status": status, "output": output})
}

/// [`ReviewApi`] that replays canned payloads and records every call.
///
/// `create_response` returns `created`; each `get_response` pops the next
/// entry of `polls`. Running out of polls is an error.
pub struct ScriptedApi {
    file_id: String,
    created: Value,
    polls: RefCell<VecDeque<Value>>,
    fail_delete: bool,
    uploads: RefCell<Vec<PathBuf>>,
    requests: RefCell<Vec<Value>>,
    deleted: RefCell<Vec<String>>,
    poll_count: RefCell<usize>,
}

impl ScriptedApi {
    pub fn new(created: Value, polls: Vec<Value>) -> Self {
        Self {
            file_id: "file-test".to_string(),
            created,
            polls: RefCell::new(polls.into()),
            fail_delete: false,
            uploads: RefCell::new(Vec::new()),
            requests: RefCell::new(Vec::new()),
            deleted: RefCell::new(Vec::new()),
            poll_count: RefCell::new(0),
        }
    }

    /// Make `delete_file` fail with a 500.
    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads.borrow().clone()
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.borrow().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.borrow().clone()
    }

    pub fn poll_count(&self) -> usize {
        *self.poll_count.borrow()
    }
}

impl ReviewApi for ScriptedApi {
    fn upload_file(&self, path: &Path) -> Result<String> {
        self.uploads.borrow_mut().push(path.to_path_buf());
        Ok(self.file_id.clone())
    }

    fn create_response(&self, payload: &Value) -> Result<Value> {
        self.requests.borrow_mut().push(payload.clone());
        Ok(self.created.clone())
    }

    fn get_response(&self, _response_id: &str) -> Result<Value> {
        *self.poll_count.borrow_mut() += 1;
        self.polls
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ReviewError::RemoteRequestFailed {
                operation: "get response",
                status: 404,
                body: "no scripted payload left".to_string(),
            })
    }

    fn delete_file(&self, file_id: &str) -> Result<()> {
        self.deleted.borrow_mut().push(file_id.to_string());
        if self.fail_delete {
            return Err(ReviewError::RemoteRequestFailed {
                operation: "delete file",
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}
