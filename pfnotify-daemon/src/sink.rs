//! Notification sink: one line per notification on an async writer.
//!
//! Each notification is written as `[target] text`, where `target` is the
//! free-form `notify.target` from the configuration.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pfnotify_log_pipeline::Notification;

/// Renders one notification line, without the trailing newline.
pub fn format_notification(target: &str, notification: &Notification) -> String {
    format!("[{target}] {}", notification.text)
}

/// Writes notifications until the channel closes or `cancel` fires.
///
/// Notifications already queued when `cancel` fires are still written.
/// Returns the number of notifications written.
pub async fn run<W>(
    mut rx: mpsc::Receiver<Notification>,
    target: &str,
    writer: &mut W,
    cancel: CancellationToken,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0u64;

    loop {
        let notification = tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some(notification) => notification,
                None => break,
            },
            () = cancel.cancelled() => break,
        };

        let mut line = format_notification(target, &notification);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        written += 1;

        tracing::debug!(
            target_channel = %target,
            kind = notification.kind,
            source = %notification.source,
            "notification delivered"
        );
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn notification(text: &str) -> Notification {
        Notification {
            text: text.to_owned(),
            kind: "firewall",
            source: "file:/var/log/pfsense.log".to_owned(),
            received_at: SystemTime::now(),
        }
    }

    #[test]
    fn format_prefixes_target() {
        let n = notification("icmp 192.168.3.20 --> 172.217.2.110, request -- rule 77");
        assert_eq!(
            format_notification("#bots", &n),
            "[#bots] icmp 192.168.3.20 --> 172.217.2.110, request -- rule 77"
        );
    }

    #[tokio::test]
    async fn writes_until_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(notification("one")).await.unwrap();
        tx.send(notification("two")).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        let written = run(rx, "#bots", &mut out, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "[#bots] one\n[#bots] two\n");
    }

    #[tokio::test]
    async fn queued_notifications_are_written_before_cancel() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(notification("last")).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut out = Vec::new();
        let written = run(rx, "ops", &mut out, cancel).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "[ops] last\n");
        drop(tx);
    }
}
