//! The interactive client shell.

use std::io::{self, BufRead, Write as _};

use quill::msg::text::split_words;
use quill::msg::AccessMask;
use quill::Client;

use crate::cli::ShellCmd;

pub async fn run(cmd: ShellCmd) -> quill::Result<()> {
    let mut client = Client::connect(&cmd.coordinator, &cmd.username).await?;
    println!("Welcome to quill, {}!", client.username());
    println!("Type 'help' for available commands or 'exit' to quit.\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("quill> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }
        let (command, args) = match input.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim()),
            None => (input.as_str(), ""),
        };
        if command == "exit" || command == "quit" {
            break;
        }
        if let Err(err) = execute(&mut client, command, args).await {
            println!("Error: {err}");
        }
    }
    Ok(())
}

fn two_args(args: &str) -> Option<(&str, &str)> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Some((a, b)),
        _ => None,
    }
}

fn three_args(args: &str) -> Option<(&str, &str, &str)> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c), None) => Some((a, b, c)),
        _ => None,
    }
}

async fn execute(client: &mut Client, command: &str, args: &str) -> quill::Result<()> {
    match command {
        "help" => print_help(),
        "CREATE" => {
            if args.is_empty() {
                println!("Usage: CREATE <filename>");
                return Ok(());
            }
            client.create(args).await?;
            println!("File '{args}' created successfully");
        }
        "READ" => {
            if args.is_empty() {
                println!("Usage: READ <filename>");
                return Ok(());
            }
            let content = client.read(args).await?;
            println!("\n=== Content of '{args}' ===\n{content}");
        }
        "WRITE" => {
            let parsed = two_args(args).and_then(|(file, idx)| {
                idx.parse::<u32>().ok().map(|sentence| (file, sentence))
            });
            let Some((file, sentence)) = parsed else {
                println!("Usage: WRITE <filename> <sentence#>");
                return Ok(());
            };
            client
                .write_sentence(file, sentence, edit_interactively)
                .await?;
            println!("Write completed successfully");
        }
        "DELETE" => {
            if args.is_empty() {
                println!("Usage: DELETE <filename>");
                return Ok(());
            }
            client.delete(args).await?;
            println!("File '{args}' deleted successfully");
        }
        "VIEW" => println!("\n{}", client.view(args).await?),
        "INFO" => {
            if args.is_empty() {
                println!("Usage: INFO <filename>");
                return Ok(());
            }
            let info = client.info(args).await?;
            println!("\n=== Info for '{args}' ===\n{info}");
        }
        "STREAM" => {
            if args.is_empty() {
                println!("Usage: STREAM <filename>");
                return Ok(());
            }
            println!("\n=== Streaming '{args}' ===");
            client
                .stream(args, |word| {
                    print!("{word} ");
                    let _ = io::stdout().flush();
                })
                .await?;
            println!("\n[Stream complete]");
        }
        "LIST" => println!("\n{}", client.list_users().await?),
        "UNDO" => {
            if args.is_empty() {
                println!("Usage: UNDO <filename>");
                return Ok(());
            }
            println!("{}", client.undo(args).await?);
        }
        "ADDACCESS" => {
            let Some((flag, file, user)) = three_args(args) else {
                println!("Usage: ADDACCESS -R|-W <filename> <username>");
                return Ok(());
            };
            let perms = match flag {
                "-R" => AccessMask::read_only(),
                "-W" => AccessMask::write_only(),
                _ => {
                    println!("Invalid flag. Use -R for read or -W for write");
                    return Ok(());
                }
            };
            println!("{}", client.add_access(file, user, perms).await?);
        }
        "REMACCESS" => {
            let Some((file, user)) = two_args(args) else {
                println!("Usage: REMACCESS <filename> <username>");
                return Ok(());
            };
            println!("{}", client.remove_access(file, user).await?);
        }
        "REQUESTACCESS" => {
            let Some((file, kind)) = two_args(args) else {
                println!("Usage: REQUESTACCESS <filename> <R|W>");
                return Ok(());
            };
            let perms = match kind {
                "R" => AccessMask::read_only(),
                "W" => AccessMask::write_only(),
                _ => {
                    println!("Invalid access type. Use R or W");
                    return Ok(());
                }
            };
            println!("{}", client.request_access(file, perms).await?);
        }
        "VIEWREQUESTS" => println!("\n{}", client.view_requests().await?),
        "APPROVEACCESS" => {
            let Some((file, user)) = two_args(args) else {
                println!("Usage: APPROVEACCESS <filename> <username>");
                return Ok(());
            };
            println!("{}", client.approve_access(file, user).await?);
        }
        "REJECTACCESS" => {
            let Some((file, user)) = two_args(args) else {
                println!("Usage: REJECTACCESS <filename> <username>");
                return Ok(());
            };
            println!("{}", client.reject_access(file, user).await?);
        }
        "CREATEFOLDER" => {
            if args.is_empty() {
                println!("Usage: CREATEFOLDER <foldername>");
                return Ok(());
            }
            println!("{}", client.create_folder(args).await?);
        }
        "CHECKPOINT" => {
            let Some((file, tag)) = two_args(args) else {
                println!("Usage: CHECKPOINT <filename> <tag>");
                return Ok(());
            };
            println!("{}", client.checkpoint(file, tag).await?);
        }
        "LISTCHECKPOINTS" => {
            if args.is_empty() {
                println!("Usage: LISTCHECKPOINTS <filename>");
                return Ok(());
            }
            println!("\n{}", client.list_checkpoints(args).await?);
        }
        "REVERT" => {
            let Some((file, tag)) = two_args(args) else {
                println!("Usage: REVERT <filename> <tag>");
                return Ok(());
            };
            println!("{}", client.revert(file, tag).await?);
        }
        _ => {
            println!("Unknown command: {command}");
            println!("Type 'help' for available commands.");
        }
    }
    Ok(())
}

fn edit_interactively(current: &str) -> String {
    println!("Current sentence: {current}\n");
    println!("Format: <word_index> <new_word>");
    println!("Type 'ETIRW' when done.\n");

    let mut words = split_words(current);
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input == "ETIRW" {
            break;
        }
        let mut parts = input.split_whitespace();
        let (Some(idx), Some(word)) = (parts.next(), parts.next()) else {
            println!("Invalid format. Use: <word_index> <new_content>");
            continue;
        };
        match idx.parse::<usize>() {
            Ok(i) if i < words.len() => {
                words[i] = word.to_string();
                println!("Word {i} updated to '{word}'");
            }
            Ok(i) if i == words.len() => {
                words.push(word.to_string());
                println!("Word {i} added: '{word}'");
            }
            _ => println!("Error: Invalid word index (0-{})", words.len()),
        }
    }
    words.join(" ")
}

fn print_help() {
    println!("\nAvailable Commands:");
    println!("==================\n");
    println!("File Operations:");
    println!("  CREATE <filename>                 - Create a new empty file");
    println!("  READ <filename>                   - Display file contents");
    println!("  WRITE <filename> <sentence#>      - Edit a sentence (word edits, end with ETIRW)");
    println!("  DELETE <filename>                 - Delete a file (owner only)");
    println!("  UNDO <filename>                   - Undo last change to file");
    println!("  INFO <filename>                   - Show file metadata");
    println!("  STREAM <filename>                 - Stream file word-by-word");
    println!();
    println!("Listing:");
    println!("  VIEW                              - List your accessible files");
    println!("  VIEW -a                           - List all files");
    println!("  VIEW -l                           - List with details");
    println!("  VIEW -al                          - List all with details");
    println!("  LIST                              - List all registered users");
    println!();
    println!("Access Control:");
    println!("  ADDACCESS -R <file> <user>        - Grant read access");
    println!("  ADDACCESS -W <file> <user>        - Grant write access");
    println!("  REMACCESS <file> <user>           - Revoke access");
    println!("  REQUESTACCESS <file> <R|W>        - Request access to a file");
    println!("  VIEWREQUESTS                      - List pending requests for your files");
    println!("  APPROVEACCESS <file> <user>       - Mark a request approved");
    println!("  REJECTACCESS <file> <user>        - Mark a request rejected");
    println!();
    println!("Folders & Checkpoints:");
    println!("  CREATEFOLDER <foldername>         - Create a folder");
    println!("  CHECKPOINT <file> <tag>           - Create a checkpoint");
    println!("  LISTCHECKPOINTS <file>            - List checkpoints");
    println!("  REVERT <file> <tag>               - Revert to checkpoint");
    println!();
    println!("System:");
    println!("  help                              - Show this help");
    println!("  exit                              - Exit the shell");
    println!();
}
