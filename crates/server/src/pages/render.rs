//! HTML for every page. Everything that came from a visitor or the backend
//! goes through [`escape`] before it is written out.

use chrono::{Datelike, Utc};
use shared::{
    domain::{ContactMessage, Project},
    error::ValidationErrors,
    protocol::{Notice, NoticeKind},
    validation::ContactForm,
};
use site_core::{guard::LOGIN_PATH, projects::live_demo_url, Category};

use crate::config::OwnerProfile;

const STYLE: &str = r#"
*{box-sizing:border-box}body{margin:0;font-family:system-ui,sans-serif;color:#1f2937;background:#f9fafb}
a{color:#2563eb;text-decoration:none}a:hover{text-decoration:underline}
.nav{display:flex;align-items:center;justify-content:space-between;padding:1rem 2rem;background:#fff;box-shadow:0 1px 2px rgba(0,0,0,.06)}
.nav .logo{font-weight:700;font-size:1.4rem;color:#111827}.nav ul{display:flex;gap:1.5rem;list-style:none;margin:0;padding:0;align-items:center}
.nav a.active{color:#111827;font-weight:600}.nav form{margin:0}
main{max-width:72rem;margin:0 auto;padding:2rem}
.hero{padding:6rem 2rem;color:#fff;text-align:center;background-size:cover;background-position:center}
.hero h1{font-size:2.8rem;margin:0 0 1rem}.hero p{max-width:40rem;margin:0 auto 2rem;font-size:1.15rem}
.button{display:inline-block;padding:.6rem 1.2rem;border-radius:.4rem;background:#2563eb;color:#fff;border:0;cursor:pointer;font-size:1rem}
.button.secondary{background:#fff;color:#1f2937;border:1px solid #d1d5db}
.filters{display:flex;flex-wrap:wrap;gap:.5rem;margin-bottom:2rem}.filters a{padding:.4rem .9rem;border-radius:999px;border:1px solid #d1d5db;color:#374151}
.filters a.active{background:#111827;color:#fff;border-color:#111827}
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(18rem,1fr));gap:1.5rem}
.card{background:#fff;border-radius:.6rem;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,.08)}
.card img{width:100%;height:11rem;object-fit:cover}.card .body{padding:1rem}
.chips{display:flex;flex-wrap:wrap;gap:.4rem;list-style:none;padding:0}.chips li{background:#eef2ff;color:#3730a3;padding:.2rem .6rem;border-radius:999px;font-size:.85rem}
.notice{padding:1rem;border-radius:.4rem;margin-bottom:1.5rem}.notice.success{background:#ecfdf5;color:#065f46}
.notice.info{background:#eff6ff;color:#1e40af}.notice.error{background:#fef2f2;color:#991b1b}
form.stacked label{display:block;margin:1rem 0 .3rem;font-weight:600}
form.stacked input,form.stacked textarea{width:100%;padding:.6rem;border:1px solid #d1d5db;border-radius:.4rem;font:inherit}
.field-error{color:#b91c1c;font-size:.9rem;margin:.3rem 0 0}
table{width:100%;border-collapse:collapse;background:#fff}th,td{text-align:left;padding:.75rem;border-bottom:1px solid #e5e7eb;vertical-align:top}
footer{background:#111827;color:#d1d5db;padding:2.5rem 2rem;margin-top:3rem}footer a{color:#fff}
footer .newsletter{display:flex;gap:.5rem;max-width:28rem}footer input{flex:1;padding:.6rem;border-radius:.4rem;border:0}
"#;

const LIVE_MESSAGES_SCRIPT: &str = r#"
(() => {
  const body = document.getElementById('messages');
  if (!body || !body.dataset.stream || !window.EventSource) return;
  const pad = (n) => String(n).padStart(2, '0');
  const format = (value) => {
    const d = new Date(value);
    const day = d.toLocaleDateString('en-US', { month: 'short', day: 'numeric', year: 'numeric' });
    return day + ' ' + pad(d.getHours()) + ':' + pad(d.getMinutes());
  };
  const source = new EventSource(body.dataset.stream);
  source.addEventListener('inserted', (event) => {
    const data = JSON.parse(event.data);
    if (data.type !== 'message_inserted') return;
    const m = data.payload.message;
    const id = String(m.id);
    if ([...body.rows].some((row) => row.dataset.id === id)) return;
    const empty = document.getElementById('no-messages');
    if (empty) empty.remove();
    const row = document.createElement('tr');
    row.dataset.id = id;
    const cell = (text) => { const td = document.createElement('td'); td.textContent = text; row.appendChild(td); return td; };
    cell(format(m.created_at));
    cell(m.name);
    const mail = cell('');
    const link = document.createElement('a');
    link.href = 'mailto:' + m.email;
    link.textContent = m.email;
    mail.appendChild(link);
    cell(m.message).style.whiteSpace = 'pre-wrap';
    body.insertBefore(row, body.firstChild);
  });
  source.addEventListener('failure', () => source.close());
})();
"#;

pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// What surrounds every page body.
pub(crate) struct Chrome<'a> {
    pub(crate) owner: &'a OwnerProfile,
    pub(crate) path: &'a str,
    pub(crate) signed_in: bool,
    pub(crate) notice: Option<&'a Notice>,
}

pub(crate) fn page(chrome: &Chrome<'_>, title: &str, body: &str) -> String {
    let notice = chrome.notice.map(notice).unwrap_or_default();
    format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{title} | {owner}</title><style>{STYLE}</style></head><body>\
{nav}<main>{notice}{body}</main>{footer}</body></html>",
        title = escape(title),
        owner = escape(&chrome.owner.name),
        nav = nav(chrome),
        footer = footer(chrome.owner),
    )
}

fn nav(chrome: &Chrome<'_>) -> String {
    let mut links = String::new();
    let mut entries = vec![("Projects", "/"), ("About", "/about"), ("Contact", "/contact")];
    if chrome.signed_in {
        entries.push(("Messages", "/admin/messages"));
    }
    for (label, href) in entries {
        let class = if chrome.path == href { " class=\"active\"" } else { "" };
        links.push_str(&format!("<li><a href=\"{href}\"{class}>{label}</a></li>"));
    }
    if chrome.signed_in {
        links.push_str(
            "<li><form method=\"post\" action=\"/logout\">\
<button class=\"button secondary\" type=\"submit\">Sign out</button></form></li>",
        );
    }
    format!(
        "<nav class=\"nav\"><a class=\"logo\" href=\"/\">{}</a><ul>{links}</ul></nav>",
        escape(&chrome.owner.initials)
    )
}

fn social_links(owner: &OwnerProfile) -> String {
    format!(
        "<ul class=\"chips social\">\
<li><a href=\"{github}\" target=\"_blank\" rel=\"noopener noreferrer\">GitHub</a></li>\
<li><a href=\"{leetcode}\" target=\"_blank\" rel=\"noopener noreferrer\">LeetCode</a></li>\
<li><a href=\"{linkedin}\" target=\"_blank\" rel=\"noopener noreferrer\">LinkedIn</a></li>\
<li><a href=\"mailto:{email}\">Email</a></li></ul>",
        github = escape(&owner.github),
        leetcode = escape(&owner.leetcode),
        linkedin = escape(&owner.linkedin),
        email = escape(&owner.email),
    )
}

fn footer(owner: &OwnerProfile) -> String {
    format!(
        "<footer><h3>Stay Updated</h3>\
<p>Subscribe to my newsletter for the latest updates and articles.</p>\
<form class=\"newsletter\" method=\"post\" action=\"/newsletter\">\
<input type=\"email\" name=\"email\" placeholder=\"Enter your email\" required>\
<button class=\"button\" type=\"submit\">Subscribe</button></form>\
{social}<p>&copy; {year} {name}. All rights reserved.</p></footer>",
        social = social_links(owner),
        year = Utc::now().year(),
        name = escape(&owner.name),
    )
}

pub(crate) fn notice(notice: &Notice) -> String {
    let kind = match notice.kind {
        NoticeKind::Success => "success",
        NoticeKind::Info => "info",
        NoticeKind::Error => "error",
    };
    format!(
        "<div class=\"notice {kind}\" role=\"status\"><strong>{}</strong><p>{}</p></div>",
        escape(&notice.title),
        escape(&notice.description)
    )
}

fn field_error(errors: Option<&ValidationErrors>, field: &str) -> String {
    errors
        .and_then(|errors| errors.for_field(field))
        .map(|message| format!("<p class=\"field-error\">{}</p>", escape(message)))
        .unwrap_or_default()
}

fn chips(items: &[String]) -> String {
    let items: String = items
        .iter()
        .map(|item| format!("<li>{}</li>", escape(item)))
        .collect();
    format!("<ul class=\"chips\">{items}</ul>")
}

pub(crate) fn home(owner: &OwnerProfile, projects: &[Project], selected: Category) -> String {
    let mut filters = String::new();
    for category in Category::ALL {
        let href = if category == Category::All {
            "/".to_string()
        } else {
            let encoded: String =
                url::form_urlencoded::byte_serialize(category.label().as_bytes()).collect();
            format!("/?category={encoded}")
        };
        let class = if category == selected { " class=\"active\"" } else { "" };
        filters.push_str(&format!(
            "<a href=\"{href}\"{class}>{}</a>",
            escape(category.label())
        ));
    }

    let mut cards = String::new();
    for project in projects {
        cards.push_str(&project_card(project));
    }
    if cards.is_empty() {
        cards.push_str("<p>No projects in this category yet.</p>");
    }

    format!(
        "<section class=\"hero\" style=\"background-image:linear-gradient(rgba(17,24,39,.7),rgba(17,24,39,.7)),url('{image}')\">\
<h1>Hi, I'm {name}</h1><p>{headline}</p>\
<a class=\"button\" href=\"/resume\">Download Resume</a>{social}</section>\
<section id=\"projects\"><h2>Projects</h2><div class=\"filters\">{filters}</div>\
<div class=\"grid\">{cards}</div></section>",
        image = escape(&owner.hero_image),
        name = escape(&owner.name),
        headline = escape(&owner.headline),
        social = social_links(owner),
    )
}

pub(crate) fn project_card(project: &Project) -> String {
    format!(
        "<article class=\"card\"><a href=\"/project/{id}\"><img src=\"{image}\" alt=\"{title}\"></a>\
<div class=\"body\"><h3><a href=\"/project/{id}\">{title}</a></h3><p>{description}</p>{tech}</div></article>",
        id = escape(project.id.as_str()),
        image = escape(&project.image_url),
        title = escape(&project.title),
        description = escape(&project.description),
        tech = chips(&project.technologies),
    )
}

pub(crate) fn project_detail(project: &Project) -> String {
    format!(
        "<p><a href=\"/\">&larr; Back to Projects</a></p><article>\
<img src=\"{image}\" alt=\"{title}\" style=\"width:100%;max-height:28rem;object-fit:cover;border-radius:.6rem\">\
<h1>{title}</h1><p><em>{category}</em></p><p>{description}</p><h2>Technologies</h2>{tech}\
<p><a class=\"button secondary\" href=\"{code}\" target=\"_blank\" rel=\"noopener noreferrer\">View Code</a> \
<a class=\"button\" href=\"{live}\" target=\"_blank\" rel=\"noopener noreferrer\">Live Demo</a></p></article>",
        image = escape(&project.image_url),
        title = escape(&project.title),
        category = escape(&project.category),
        description = escape(&project.description),
        tech = chips(&project.technologies),
        code = escape(&project.github_url),
        live = escape(&live_demo_url(&project.live_url)),
    )
}

pub(crate) fn project_not_found() -> String {
    "<section><h1>Project not found</h1>\
<p>The project you're looking for doesn't exist or has been removed.</p>\
<a class=\"button\" href=\"/\">Return Home</a></section>"
        .to_string()
}

pub(crate) fn about(owner: &OwnerProfile) -> String {
    let bio: String = owner
        .bio
        .iter()
        .map(|paragraph| format!("<p>{}</p>", escape(paragraph)))
        .collect();
    let certifications: String = owner
        .certifications
        .iter()
        .map(|item| format!("<li>{}</li>", escape(item)))
        .collect();
    format!(
        "<h1>About Me</h1><section>{bio}</section>\
<section><h2>Skills</h2>{skills}</section>\
<section><h2>Languages</h2>{languages}</section>\
<section><h2>Certifications</h2><ul>{certifications}</ul></section>",
        skills = chips(&owner.skills),
        languages = chips(&owner.languages),
    )
}

pub(crate) fn contact(
    owner: &OwnerProfile,
    form: &ContactForm,
    errors: Option<&ValidationErrors>,
) -> String {
    format!(
        "<h1>Contact Me</h1><div class=\"grid\">\
<section><h2>Send a Message</h2><form class=\"stacked\" method=\"post\" action=\"/contact\" novalidate>\
<label for=\"name\">Name</label><input id=\"name\" name=\"name\" value=\"{name}\">{name_error}\
<label for=\"email\">Email</label><input id=\"email\" name=\"email\" type=\"email\" value=\"{email}\">{email_error}\
<label for=\"message\">Message</label><textarea id=\"message\" name=\"message\" rows=\"6\">{message}</textarea>{message_error}\
<p><button class=\"button\" type=\"submit\">Send Message</button></p></form></section>\
<section><h2>Connect With Me</h2>{social}<h3>Location</h3><p>{location}</p><p>{availability}</p></section></div>",
        name = escape(&form.name),
        email = escape(&form.email),
        message = escape(&form.message),
        name_error = field_error(errors, "name"),
        email_error = field_error(errors, "email"),
        message_error = field_error(errors, "message"),
        social = social_links(owner),
        location = escape(&owner.location),
        availability = escape(&owner.availability),
    )
}

pub(crate) fn login(next: Option<&str>, email: &str, errors: Option<&ValidationErrors>) -> String {
    let next = next
        .map(|next| format!("<input type=\"hidden\" name=\"next\" value=\"{}\">", escape(next)))
        .unwrap_or_default();
    format!(
        "<section style=\"max-width:26rem;margin:0 auto\"><h1>Admin Login</h1>\
<form class=\"stacked\" method=\"post\" action=\"{LOGIN_PATH}\" novalidate>{next}\
<label for=\"email\">Email</label><input id=\"email\" name=\"email\" type=\"email\" value=\"{email}\" autocomplete=\"username\">{email_error}\
<label for=\"password\">Password</label><input id=\"password\" name=\"password\" type=\"password\" autocomplete=\"current-password\">{password_error}\
<p><button class=\"button\" type=\"submit\">Sign In</button></p></form></section>",
        email = escape(email),
        email_error = field_error(errors, "email"),
        password_error = field_error(errors, "password"),
    )
}

pub(crate) fn message_row(message: &ContactMessage) -> String {
    format!(
        "<tr data-id=\"{id}\"><td>{date}</td><td>{name}</td>\
<td><a href=\"mailto:{email}\">{email}</a></td><td style=\"white-space:pre-wrap\">{body}</td></tr>",
        id = escape(message.id.as_str()),
        date = message.created_at.format("%b %-d, %Y %H:%M"),
        name = escape(&message.name),
        email = escape(&message.email),
        body = escape(&message.message),
    )
}

/// `stream_url` is where the page's live updates resume from.
pub(crate) fn admin_messages(messages: &[ContactMessage], stream_url: &str) -> String {
    let mut rows: String = messages.iter().map(message_row).collect();
    if rows.is_empty() {
        rows.push_str("<tr id=\"no-messages\"><td colspan=\"4\">No messages yet</td></tr>");
    }
    format!(
        "<h1>Contact Messages</h1><table><thead><tr><th>Date</th><th>Name</th><th>Email</th><th>Message</th></tr></thead>\
<tbody id=\"messages\" data-stream=\"{}\">{rows}</tbody></table><script>{LIVE_MESSAGES_SCRIPT}</script>",
        escape(stream_url)
    )
}

/// Body for pages that only exist to show a notice, such as a newsletter
/// sign-up posted from the footer.
pub(crate) fn notice_only(link_href: &str, link_label: &str) -> String {
    format!(
        "<p><a class=\"button secondary\" href=\"{}\">{}</a></p>",
        escape(link_href),
        escape(link_label)
    )
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
