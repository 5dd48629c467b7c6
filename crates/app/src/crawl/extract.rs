use chrono::{DateTime, Utc};

use harvest_core::domain::comments::{Comment, Reply};
use harvest_infra::bilibili::ReplyItem;

pub fn build_comment(item: &ReplyItem, video_id: &str, video_title: &str) -> Comment {
    let replies = item
        .replies
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|reply| Reply {
            author_name: reply.member.uname.clone(),
            content: reply.content.message.clone(),
            time: from_unix(reply.ctime),
        })
        .collect();
    Comment {
        comment_id: item.rpid.to_string(),
        video_id: video_id.to_string(),
        video_title: video_title.to_string(),
        author_name: item.member.uname.clone(),
        content: item.content.message.clone(),
        publish_time: from_unix(item.ctime),
        like_count: item.like.max(0),
        replies,
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
