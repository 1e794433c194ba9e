//! Minimal RSS 2.0 reader for podcast feeds.
//!
//! Understands the fields podcast feeds actually use: the plain RSS item
//! elements, `itunes:*` extensions, `content:encoded`, `dc:creator`,
//! `media:thumbnail` and audio enclosures. Channel author and artwork are
//! used as fallbacks for items that lack their own.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::models::Episode;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub title: String,
    pub author: String,
    pub image_url: String,
    pub episodes: Vec<Episode>,
}

pub fn parse_feed(xml: &str) -> Result<Feed> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = Feed::default();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<Episode> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = qualified_name(&e);
                if name == "item" {
                    current = Some(Episode::default());
                }
                read_attributes(&name, &e, current.as_mut(), &mut feed);
                stack.push(name);
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                let name = qualified_name(&e);
                read_attributes(&name, &e, current.as_mut(), &mut feed);
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                text.push_str(&value);
            }
            Ok(Event::CData(c)) => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(_)) => {
                let name = stack.pop().unwrap_or_default();
                let parent = stack.last().map(|s| s.as_str()).unwrap_or("");
                let value = std::mem::take(&mut text).trim().to_string();

                if name == "item" {
                    if let Some(mut episode) = current.take() {
                        if episode.summary.is_empty() {
                            episode.summary = strip_html(&episode.description);
                        }
                        feed.episodes.push(episode);
                    }
                } else if let Some(episode) = current.as_mut() {
                    assign_item_field(episode, &name, value);
                } else {
                    assign_channel_field(&mut feed, &name, parent, value);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e.to_string())),
            _ => {}
        }
    }

    for episode in &mut feed.episodes {
        if episode.author.is_empty() {
            episode.author = feed.author.clone();
        }
        if episode.image_url.is_empty() {
            episode.image_url = feed.image_url.clone();
        }
    }

    Ok(feed)
}

fn qualified_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn read_attributes(name: &str, e: &BytesStart, item: Option<&mut Episode>, feed: &mut Feed) {
    match item {
        Some(episode) => match name {
            "enclosure" => {
                let is_audio = attribute(e, "type")
                    .map(|t| t.starts_with("audio"))
                    .unwrap_or(false);
                if let (true, Some(url)) = (is_audio, attribute(e, "url")) {
                    episode.audio_url = url;
                }
            }
            "itunes:image" => {
                if let Some(href) = attribute(e, "href") {
                    episode.image_url = href;
                }
            }
            "media:thumbnail" if episode.image_url.is_empty() => {
                if let Some(url) = attribute(e, "url") {
                    episode.image_url = url;
                }
            }
            _ => {}
        },
        None => {
            if name == "itunes:image" {
                if let Some(href) = attribute(e, "href") {
                    feed.image_url = href;
                }
            }
        }
    }
}

fn assign_item_field(episode: &mut Episode, name: &str, value: String) {
    if value.is_empty() {
        return;
    }
    match name {
        "title" => episode.title = value,
        "itunes:author" => episode.author = value,
        "dc:creator" if episode.author.is_empty() => episode.author = value,
        "link" => episode.link = value,
        "pubDate" => episode.published = parse_pub_date(&value),
        "guid" => episode.guid = value,
        "itunes:summary" => episode.summary = value,
        "content:encoded" => episode.description = value,
        "description" if episode.description.is_empty() => episode.description = value,
        _ => {}
    }
}

fn assign_channel_field(feed: &mut Feed, name: &str, parent: &str, value: String) {
    if value.is_empty() {
        return;
    }
    match (parent, name) {
        ("channel", "title") => feed.title = value,
        ("channel", "itunes:author") => feed.author = value,
        ("itunes:owner", "itunes:name") if feed.author.is_empty() => feed.author = value,
        ("image", "url") if feed.image_url.is_empty() => feed.image_url = value,
        _ => {}
    }
}

/// RFC 2822 as RSS specifies, with RFC 3339 for feeds that ignore that.
pub fn parse_pub_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(s.trim()))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

/// Drop tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
