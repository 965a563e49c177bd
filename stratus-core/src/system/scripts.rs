//! Shell command builders for post-provisioning configuration.
//!
//! Each function renders the command a service executes on a host through
//! the SSH runner. Commands run under sudo and are safe to re-run.

/// Format a block device (unless already formatted) and mount it, recording
/// the mount in fstab.
pub fn format_and_mount(device: &str, mount_point: &str, fs_format: &str) -> String {
    format!(
        "sudo sh -c 'blkid {device} >/dev/null 2>&1 || mkfs -t {fs_format} {device}; \
         mkdir -p {mount_point}; \
         mount {device} {mount_point}; \
         grep -q \"^{device} \" /etc/fstab || echo \"{device} {mount_point} {fs_format} defaults 0 2\" >>/etc/fstab'"
    )
}

/// Unmount a block device, drop its fstab line and remove the mount point.
pub fn umount_device(device: &str, mount_point: &str) -> String {
    format!(
        "sudo sh -c 'umount {device}; \
         sed -i \"\\\\|^{device} |d\" /etc/fstab; \
         rmdir {mount_point} 2>/dev/null || true'"
    )
}

/// Export a directory over NFS.
pub fn nfs_export_add(path: &str) -> String {
    format!(
        "sudo sh -c 'mkdir -p {path}; \
         chmod a+rwx {path}; \
         echo \"{path} *(rw,sync,no_subtree_check,no_root_squash)\" >>/etc/exports; \
         exportfs -ra'"
    )
}

/// Withdraw an NFS export.
pub fn nfs_export_remove(path: &str) -> String {
    format!(
        "sudo sh -c 'sed -i \"\\\\|^{path} |d\" /etc/exports; \
         exportfs -ra'"
    )
}

/// Mount a remote NFS export.
pub fn nfs_mount(server_ip: &str, export_path: &str, mount_point: &str) -> String {
    format!(
        "sudo sh -c 'mkdir -p {mount_point}; \
         mount -t nfs -o rw,soft {server_ip}:{export_path} {mount_point}'"
    )
}

/// Unmount a remote NFS export.
pub fn nfs_umount(mount_point: &str) -> String {
    format!("sudo sh -c 'umount -f {mount_point}; rmdir {mount_point} 2>/dev/null || true'")
}

/// Mount an object-storage bucket through a FUSE filesystem.
pub fn bucket_mount(bucket: &str, endpoint: &str, mount_point: &str) -> String {
    format!(
        "sudo sh -c 'mkdir -p {mount_point}; \
         s3fs {bucket} {mount_point} -o url={endpoint} -o use_path_request_style -o allow_other'"
    )
}

/// Unmount an object-storage bucket.
pub fn bucket_umount(mount_point: &str) -> String {
    format!("sudo sh -c 'umount {mount_point}; rmdir {mount_point} 2>/dev/null || true'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_command_formats_once() {
        let cmd = format_and_mount("/dev/vdb", "/data/volumetest", "ext4");
        assert!(cmd.contains("mkfs -t ext4 /dev/vdb"));
        assert!(cmd.contains("blkid /dev/vdb"));
        assert!(cmd.contains("/etc/fstab"));
    }

    #[test]
    fn nfs_commands_reference_the_export() {
        assert!(nfs_export_add("/shared/data").contains("exportfs -ra"));
        assert!(nfs_mount("192.168.0.10", "/shared/data", "/mnt/data")
            .contains("192.168.0.10:/shared/data"));
    }
}
