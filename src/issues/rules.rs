//! Per-page issue rules

use crate::crawler::PageReport;
use crate::issues::IssueType;

/// Returns the issues found on a single crawled page
///
/// Status rules apply to every response; content rules only to successful
/// HTML responses.
pub fn page_issues(report: &PageReport) -> Vec<IssueType> {
    let mut issues = Vec::new();

    if !report.crawled {
        return issues;
    }

    match report.status_code {
        300..=399 => issues.push(IssueType::Redirect),
        400..=499 => issues.push(IssueType::ClientError),
        500..=599 => issues.push(IssueType::ServerError),
        _ => {}
    }

    if report.noindex {
        issues.push(IssueType::Noindex);
    }

    if !(200..300).contains(&report.status_code) || !report.is_html() {
        return issues;
    }

    if report.title.trim().is_empty() {
        issues.push(IssueType::TitleMissing);
    }
    if report.description.trim().is_empty() {
        issues.push(IssueType::DescriptionMissing);
    }
    if report.h1.trim().is_empty() {
        issues.push(IssueType::H1Missing);
    }
    if report.lang.trim().is_empty() {
        issues.push(IssueType::LangMissing);
    }
    if report
        .images
        .iter()
        .any(|image| image.alt.as_deref().map_or(true, |alt| alt.trim().is_empty()))
    {
        issues.push(IssueType::ImagesWithoutAlt);
    }
    if !report.valid_headings {
        issues.push(IssueType::InvalidHeadingOrder);
    }

    issues
}
