use super::*;

#[test]
fn parses_upload_with_overrides() {
    let cli = Cli::try_parse_from([
        "tools",
        "--database-url",
        "sqlite::memory:",
        "upload-resume",
        "cv.pdf",
        "--name",
        "Resume.pdf",
    ])
    .expect("parse");
    assert_eq!(cli.database_url, "sqlite::memory:");
    match cli.command {
        Command::UploadResume { path, name, content_type } => {
            assert_eq!(path, PathBuf::from("cv.pdf"));
            assert_eq!(name.as_deref(), Some("Resume.pdf"));
            assert!(content_type.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn guesses_resume_content_type_from_extension() {
    assert_eq!(content_type_for(Path::new("cv.PDF")), Some("application/pdf"));
    assert_eq!(
        content_type_for(Path::new("Resume.docx")),
        Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
    );
    assert_eq!(content_type_for(Path::new("cv")), None);
}
