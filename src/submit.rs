use thiserror::Error;

use crate::api::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitKind {
    Post,
    Comment,
}

impl SubmitKind {
    pub fn idle_label(self) -> &'static str {
        match self {
            SubmitKind::Post => "发表",
            SubmitKind::Comment => "回复",
        }
    }

    pub fn busy_label(self) -> &'static str {
        match self {
            SubmitKind::Post => "发表中...",
            SubmitKind::Comment => "回复中...",
        }
    }

    fn empty_prompt(self) -> &'static str {
        match self {
            SubmitKind::Post => "请输入帖子内容",
            SubmitKind::Comment => "请输入评论内容",
        }
    }

    fn failure_prefix(self) -> &'static str {
        match self {
            SubmitKind::Post => "发布失败",
            SubmitKind::Comment => "发布评论失败",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("{}", .0.empty_prompt())]
    Validation(SubmitKind),
    #[error("{}: {source}", .kind.failure_prefix())]
    Request {
        kind: SubmitKind,
        #[source]
        source: FetchError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Started { request_id: u64 },
    /// The control was already submitting; nothing happened.
    Ignored,
}

/// A submit button: disabled with a busy label while its request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitControl {
    kind: SubmitKind,
    pending: Option<u64>,
}

impl SubmitControl {
    pub fn new(kind: SubmitKind) -> Self {
        Self {
            kind,
            pending: None,
        }
    }

    pub fn kind(&self) -> SubmitKind {
        self.kind
    }

    pub fn is_submitting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_request(&self) -> Option<u64> {
        self.pending
    }

    pub fn label(&self) -> &'static str {
        if self.is_submitting() {
            self.kind.busy_label()
        } else {
            self.kind.idle_label()
        }
    }

    /// Returns false when already submitting.
    pub fn begin(&mut self, request_id: u64) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(request_id);
        true
    }

    /// Re-enables the control if `request_id` is the one it is waiting on.
    pub fn finish(&mut self, request_id: u64) -> bool {
        if self.pending == Some(request_id) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

/// Text input paired with its submit control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composer {
    pub text: String,
    pub control: SubmitControl,
}

impl Composer {
    pub fn new(kind: SubmitKind) -> Self {
        Self {
            text: String::new(),
            control: SubmitControl::new(kind),
        }
    }

    /// Trimmed content ready to send.
    pub fn content(&self) -> Result<String, SubmitError> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            return Err(SubmitError::Validation(self.control.kind()));
        }
        Ok(trimmed.to_string())
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_fails_validation() {
        let mut composer = Composer::new(SubmitKind::Comment);
        composer.text = "  \n\t ".into();
        let err = composer.content().unwrap_err();
        assert_eq!(err, SubmitError::Validation(SubmitKind::Comment));
        assert_eq!(err.to_string(), "请输入评论内容");
    }

    #[test]
    fn content_is_trimmed() {
        let mut composer = Composer::new(SubmitKind::Post);
        composer.text = "  你好  ".into();
        assert_eq!(composer.content().unwrap(), "你好");
    }

    #[test]
    fn control_is_reentrancy_guarded() {
        let mut control = SubmitControl::new(SubmitKind::Post);
        assert_eq!(control.label(), "发表");
        assert!(control.begin(1));
        assert_eq!(control.label(), "发表中...");
        assert!(!control.begin(2));
        assert!(!control.finish(2));
        assert!(control.is_submitting());
        assert!(control.finish(1));
        assert_eq!(control.label(), "发表");
    }

    #[test]
    fn request_errors_explain_themselves() {
        let err = SubmitError::Request {
            kind: SubmitKind::Comment,
            source: FetchError::Timeout,
        };
        assert_eq!(err.to_string(), "发布评论失败: 请求超时");
        assert_eq!(SubmitKind::Comment.busy_label(), "回复中...");
    }
}
