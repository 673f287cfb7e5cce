// Path handling shared by the mount manager and the kernel proxy

use crate::interface;

/// Makes `origp` absolute against `cwd` and folds away `.`, `..` and
/// repeated separators. `..` at the root stays at the root.
pub fn normpath(origp: &str, cwd: &str) -> String {
    let origp = interface::RustPathBuf::from(origp);
    //If path is relative, prefix it with the current working directory, otherwise populate it with rootdir
    let mut newp = if origp.is_relative() {
        normpath(cwd, "/").into()
    } else {
        interface::RustPathBuf::from("/")
    };

    for comp in origp.components() {
        match comp {
            //if we have a normal path component, push it on to our normed path
            interface::RustPathComponent::Normal(_) => newp.push(comp),

            //if we have a .. path component, pop the last component off our normed path
            interface::RustPathComponent::ParentDir => {
                newp.pop();
            }

            //if we have a . path component (or a root dir) do nothing
            _ => {}
        };
    }
    newp.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normpath_absolute() {
        assert_eq!(normpath("/", "/"), "/");
        assert_eq!(normpath("/../..//", "/tmp"), "/");
        assert_eq!(normpath("/a/./b//c/", "/"), "/a/b/c");
        assert_eq!(normpath("/a/b/../c", "/"), "/a/c");
    }

    #[test]
    fn test_normpath_relative() {
        assert_eq!(normpath("file", "/home/user"), "/home/user/file");
        assert_eq!(normpath("../x", "/home/user"), "/home/x");
        assert_eq!(normpath(".", "/home"), "/home");
        assert_eq!(normpath("", "/home"), "/home");
    }
}
