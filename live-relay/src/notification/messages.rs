//! Notification text.

use crate::accounts::TrackedAccount;

/// "Went live" notification.
pub fn live_started(account: &TrackedAccount) -> String {
    format!(
        "您关注的{}开播啦！快去直播间 DD 吧～\n直播间标题：{}\n直播间链接：{}",
        account.display_name(),
        account.room_title(),
        account.room_url()
    )
}

/// "Went offline" notification.
pub fn live_stopped(account: &TrackedAccount) -> String {
    format!(
        "您关注的{}下播啦！感谢观看，记得下次再来 DD 哦～",
        account.display_name()
    )
}

/// Relayed chat message.
pub fn danmu_relay(account: &TrackedAccount, speaker: &str, text: &str) -> String {
    format!(
        "【弹幕中继】\n主播：{}\n直播间标题：{}\n发送人：{}\n内容：{}",
        account.display_name(),
        account.room_title(),
        speaker,
        text
    )
}

/// Whether `text` contains any of `keywords`.
pub fn matches_keywords(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword.as_str()))
}
